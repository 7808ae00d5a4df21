use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use strata_common::{
    Result,
    error::{Error, ErrorKind},
};
use strata_format::{FieldPath, PrimitiveType, SchemaNode, TypeName};
use strata_io::{
    BindTarget, DatasetHandle, GroupHandle, OutputSink, RecordFrame, RecordView, SharedSink,
    SourceNamespace, TableSource, TypeHandle, TypeRef,
    memory::{ColumnData, MemorySink, MemoryTable, TypeDef},
};

use crate::{
    binder::RowBinder,
    descriptor::DescriptorBuilder,
    diagnostics::{CollectedDiagnostics, Diagnostic},
    namespace::{ConvertParams, NamespaceConverter, TableErrorPolicy},
    planner::LayoutPlan,
    strategy::{
        LeafBinding, LeafConversion, MemberLayout, OutputType, SequenceStrategy,
        StrategyRegistry, TypeStrategy,
    },
    table::{SkipReason, TableConverter, TableOutcome},
};

fn scenario_schema() -> SchemaNode {
    SchemaNode::group(
        "events",
        vec![
            SchemaNode::leaf("a", "Int_t"),
            SchemaNode::leaf("b", "Double_t"),
            SchemaNode::group(
                "c",
                vec![
                    SchemaNode::leaf("leaf_1", "Int_t"),
                    SchemaNode::leaf("leaf_2", "Bool_t"),
                ],
            ),
        ],
    )
}

fn scenario_table(name: &str, records: usize) -> MemoryTable {
    let records = (0..records)
        .map(|i| {
            json!({
                "a": i,
                "b": i as f64 * 0.5,
                "c": { "leaf_1": i * 10, "leaf_2": i % 2 == 0 },
            })
        })
        .collect::<Vec<_>>();
    MemoryTable::from_json(name, scenario_schema(), &records).unwrap()
}

fn root_def(sink: &MemorySink, dataset: DatasetHandle) -> TypeDef {
    sink.dataset_type(dataset).unwrap().clone()
}

#[test]
fn test_scenario_three_records() {
    let registry = StrategyRegistry::builtin();
    let diagnostics = CollectedDiagnostics::new();
    let mut table = scenario_table("events", 3);
    let mut sink = MemorySink::new();
    let root = sink.root_group();

    let plan = LayoutPlan::plan(table.schema(), &registry, &diagnostics).unwrap();
    let top_level = plan.children(&FieldPath::root()).count();
    assert_eq!(top_level, 3);
    let c = plan.lookup(&"c".into()).unwrap();
    assert!(c.size >= 5);
    assert_eq!(plan.lookup(&"c.leaf_1".into()).unwrap().relative_offset, 0);
    assert_eq!(plan.lookup(&"c.leaf_2".into()).unwrap().relative_offset, 4);

    let outcome = TableConverter::new(&registry, &diagnostics)
        .convert(&mut table, &mut sink, root)
        .unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.records, 3);
    assert_eq!(report.fields, 4);

    let dataset = sink.find_dataset("events").unwrap();
    let def = root_def(&sink, dataset);
    assert_eq!(def.fields().len(), 3);
    assert_eq!(def.size(), plan.buffer_size());
    let c_def = &def.field("c").unwrap().ty;
    assert_eq!(c_def.field("leaf_1").unwrap().offset, 0);
    assert_eq!(c_def.field("leaf_2").unwrap().offset, 4);

    assert_eq!(sink.written_count(dataset).unwrap(), 3);
    assert_eq!(
        sink.decode_record(dataset, 1).unwrap(),
        json!({ "a": 1, "b": 0.5, "c": { "leaf_1": 10, "leaf_2": false } })
    );
    assert_eq!(sink.open_type_count(), 0);
    assert_eq!(sink.open_dataset_count(), 0);
    assert!(diagnostics.events().contains(&Diagnostic::TableConverted {
        table: "events".to_string(),
        records: 3,
    }));
}

#[test]
fn test_leaf_paths_agree_across_passes() {
    let registry = StrategyRegistry::builtin();
    let schema = SchemaNode::group(
        "t",
        vec![
            SchemaNode::leaf("n", "int"),
            SchemaNode::leaf("junk", "TRef"),
            SchemaNode::group("single", vec![SchemaNode::leaf("v", "float")]),
            SchemaNode::group(
                "g",
                vec![
                    SchemaNode::leaf("arr", "Int_t[4]"),
                    SchemaNode::leaf("seq", "vector<double>"),
                    SchemaNode::group("dead", vec![SchemaNode::leaf("x", "TRef")]),
                ],
            ),
        ],
    );
    let mut table = MemoryTable::from_json(
        "t",
        schema.clone(),
        &[json!({ "n": 1, "single": 2.0, "g": { "arr": [1, 2, 3, 4], "seq": [1.0] } })],
    )
    .unwrap();

    let plan = LayoutPlan::plan(&schema, &registry, &CollectedDiagnostics::new()).unwrap();
    let mut sink = MemorySink::new();
    let descriptor = DescriptorBuilder::new(&plan, &registry)
        .build(&schema, &mut sink)
        .unwrap();
    let mut frame = RecordFrame::new(plan.buffer_size());
    let (converter, deallocator) = RowBinder::new(&plan, &registry)
        .bind(&schema, &mut frame, &mut table)
        .unwrap();

    let expected = ["n", "single", "g.arr", "g.seq"]
        .map(FieldPath::from)
        .to_vec();
    assert_eq!(plan.leaf_paths(), expected);
    assert_eq!(descriptor.leaf_paths(), expected);
    assert_eq!(converter.leaf_paths(), expected);
    assert_eq!(
        sink.type_size(descriptor.root.into()).unwrap(),
        plan.buffer_size()
    );

    deallocator.run(&mut frame).unwrap();
    descriptor.teardown.run(&mut sink).unwrap();
    assert_eq!(sink.open_type_count(), 0);
}

#[test]
fn test_passes_are_idempotent() {
    let registry = StrategyRegistry::builtin();
    let schema = scenario_schema();
    let first = LayoutPlan::plan(&schema, &registry, &CollectedDiagnostics::new()).unwrap();
    let second = LayoutPlan::plan(&schema, &registry, &CollectedDiagnostics::new()).unwrap();
    assert_eq!(first.entries(), second.entries());
    assert_eq!(first.buffer_size(), second.buffer_size());

    let mut sink = MemorySink::new();
    let builder = DescriptorBuilder::new(&first, &registry);
    let one = builder.build(&schema, &mut sink).unwrap();
    let two = builder.build(&schema, &mut sink).unwrap();
    assert_ne!(one.root, two.root);
    assert_eq!(sink.type_def(one.root).unwrap(), sink.type_def(two.root).unwrap());

    let mut table = scenario_table("events", 1);
    let binder = RowBinder::new(&first, &registry);
    let mut frame = RecordFrame::new(first.buffer_size());
    let (conv_one, _) = binder.bind(&schema, &mut frame, &mut table).unwrap();
    let (conv_two, _) = binder.bind(&schema, &mut frame, &mut table).unwrap();
    assert_eq!(conv_one.leaf_paths(), conv_two.leaf_paths());
}

#[test]
fn test_scalar_group_flattened() {
    let registry = StrategyRegistry::builtin();
    let diagnostics = CollectedDiagnostics::new();
    let schema = SchemaNode::group(
        "t",
        vec![SchemaNode::group("x", vec![SchemaNode::leaf("only", "int32")])],
    );
    let mut table =
        MemoryTable::from_json("t", schema, &[json!({ "x": 5 }), json!({ "x": -5 })]).unwrap();
    let plan = LayoutPlan::plan(table.schema(), &registry, &diagnostics).unwrap();
    assert_eq!(plan.entries().len(), 1);
    assert!(plan.entries()[0].is_leaf());
    assert_eq!(plan.entries()[0].path.as_str(), "x");

    let mut sink = MemorySink::new();
    let root = sink.root_group();
    TableConverter::new(&registry, &diagnostics)
        .convert(&mut table, &mut sink, root)
        .unwrap();
    let dataset = sink.find_dataset("t").unwrap();
    let def = root_def(&sink, dataset);
    assert_eq!(def.fields().len(), 1);
    assert_eq!(
        def.field("x").unwrap().ty,
        TypeDef::Primitive {
            ty: PrimitiveType::Int32
        }
    );
    assert_eq!(sink.decode_record(dataset, 1).unwrap(), json!({ "x": -5 }));
}

#[test]
fn test_non_scalar_groups_nest() {
    let registry = StrategyRegistry::builtin();
    let schema = SchemaNode::group(
        "t",
        vec![SchemaNode::group(
            "outer",
            vec![SchemaNode::group("inner", vec![SchemaNode::leaf("v", "int")])],
        )],
    );
    let plan = LayoutPlan::plan(&schema, &registry, &CollectedDiagnostics::new()).unwrap();
    let paths = plan
        .entries()
        .iter()
        .map(|e| e.path.as_str())
        .collect::<Vec<_>>();
    // `inner` is flattened into a field of `outer`; `outer` has a group child, so it nests
    assert_eq!(paths, ["outer", "outer.inner"]);
    assert!(plan.lookup(&"outer.inner".into()).unwrap().is_leaf());
}

#[test]
fn test_unknown_type_is_skipped_everywhere() {
    let registry = StrategyRegistry::builtin();
    let diagnostics = CollectedDiagnostics::new();
    let schema = SchemaNode::group(
        "t",
        vec![
            SchemaNode::leaf("a", "int"),
            SchemaNode::leaf("obj", "TLorentzVector"),
        ],
    );
    let mut table =
        MemoryTable::from_json("t", schema, &[json!({ "a": 3, "obj": { "px": 1 } })]).unwrap();
    let mut sink = MemorySink::new();
    let root = sink.root_group();
    let outcome = TableConverter::new(&registry, &diagnostics)
        .convert(&mut table, &mut sink, root)
        .unwrap();

    assert_eq!(
        outcome.report().unwrap().skipped_fields,
        [FieldPath::from("obj")]
    );
    assert_eq!(diagnostics.unsupported_paths(), [FieldPath::from("obj")]);
    let dataset = sink.find_dataset("t").unwrap();
    assert!(root_def(&sink, dataset).field("obj").is_none());
    assert_eq!(sink.decode_record(dataset, 0).unwrap(), json!({ "a": 3 }));
}

#[test]
fn test_table_without_supported_fields_is_skipped() {
    let registry = StrategyRegistry::builtin();
    let diagnostics = CollectedDiagnostics::new();
    let schema = SchemaNode::group(
        "t",
        vec![SchemaNode::group("g", vec![SchemaNode::leaf("o", "TObject")])],
    );
    let mut table = MemoryTable::new("t", schema, 10).unwrap();
    let mut sink = MemorySink::new();
    let root = sink.root_group();
    let outcome = TableConverter::new(&registry, &diagnostics)
        .convert(&mut table, &mut sink, root)
        .unwrap();
    assert_eq!(outcome, TableOutcome::Skipped(SkipReason::NoMappedFields));
    assert_eq!(sink.dataset_count(), 0);
    assert_eq!(sink.open_type_count(), 0);
    assert_eq!(
        diagnostics.count(|d| matches!(d, Diagnostic::EmptyTable { .. })),
        1
    );
}

#[test]
fn test_sequences_end_to_end() {
    let registry = StrategyRegistry::builtin();
    let diagnostics = CollectedDiagnostics::new();
    let schema = SchemaNode::group(
        "t",
        vec![
            SchemaNode::leaf("id", "UShort_t"),
            SchemaNode::leaf("hits", "vector<float>"),
            SchemaNode::leaf("tracks", "std::vector<std::vector<Long64_t> >"),
            SchemaNode::leaf("pos", "Double_t[2]"),
        ],
    );
    let records = [
        json!({ "id": 1, "hits": [], "tracks": [[1, 2], []], "pos": [0.0, 1.0] }),
        json!({ "id": 2, "hits": [0.5, 1.5, 2.5], "tracks": [[-3]], "pos": [2.0, 3.0] }),
    ];
    let mut table = MemoryTable::from_json("t", schema, &records).unwrap();
    let mut sink = MemorySink::new();
    let root = sink.root_group();
    TableConverter::new(&registry, &diagnostics)
        .convert(&mut table, &mut sink, root)
        .unwrap();

    let dataset = sink.find_dataset("t").unwrap();
    for (index, record) in records.iter().enumerate() {
        assert_eq!(&sink.decode_record(dataset, index).unwrap(), record);
    }
    let def = root_def(&sink, dataset);
    let TypeDef::Sequence { element } = &def.field("tracks").unwrap().ty else {
        panic!("expected a sequence");
    };
    assert!(matches!(**element, TypeDef::Sequence { .. }));
    assert_eq!(sink.open_type_count(), 0);
}

/// A strategy for `traced <scalar>` types that records every step it takes.
struct TracingStrategy {
    log: Arc<Mutex<Vec<String>>>,
}

impl TracingStrategy {
    fn inner(ty: &TypeName) -> Option<PrimitiveType> {
        ty.as_str()
            .strip_prefix("traced ")
            .and_then(PrimitiveType::from_type_name)
    }
}

impl TypeStrategy for TracingStrategy {
    fn name(&self) -> &'static str {
        "traced"
    }

    fn can_handle(&self, ty: &TypeName) -> bool {
        Self::inner(ty).is_some()
    }

    fn member_layout(&self, ty: &TypeName) -> Option<MemberLayout> {
        Self::inner(ty).map(|p| MemberLayout {
            size: p.size(),
            align: p.align(),
        })
    }

    fn output_type(&self, ty: &TypeName, sink: &mut dyn OutputSink) -> Result<OutputType> {
        let inner = Self::inner(ty).ok_or_else(|| Error::invalid_arg("ty", "not traced"))?;
        let handle = sink.create_array_type(inner.into(), 1)?;
        let mut output = OutputType::primitive(handle.into());
        let log = self.log.clone();
        let name = ty.to_string();
        output.teardown.custom(move |sink| {
            log.lock().unwrap().push(format!("type {name}"));
            sink.close_type(handle)
        });
        Ok(output)
    }

    fn bind(
        &self,
        leaf: &LeafBinding<'_>,
        _frame: &mut RecordFrame,
        source: &mut dyn TableSource,
    ) -> Result<LeafConversion> {
        source.bind_field(
            leaf.path,
            BindTarget::Slot {
                offset: leaf.offset,
                size: leaf.size,
            },
        )?;
        let path = leaf.path.to_string();
        let (convert_log, free_log) = (self.log.clone(), self.log.clone());
        let free_path = path.clone();
        Ok(LeafConversion {
            converter: Some(Box::new(move |_: &mut RecordFrame| {
                convert_log.lock().unwrap().push(format!("convert {path}"));
                Ok(())
            })),
            deallocator: Some(Box::new(move |_: &mut RecordFrame| {
                free_log.lock().unwrap().push(format!("free {free_path}"));
                Ok(())
            })),
        })
    }
}

fn traced_table(records: usize) -> MemoryTable {
    let schema = SchemaNode::group(
        "traced",
        vec![
            SchemaNode::leaf("p", "traced int"),
            SchemaNode::group(
                "g",
                vec![
                    SchemaNode::leaf("q", "traced short"),
                    SchemaNode::leaf("r", "traced double"),
                ],
            ),
        ],
    );
    MemoryTable::new("traced", schema, records)
        .unwrap()
        .with_column(
            "p",
            ColumnData::scalars(PrimitiveType::Int32, &vec![7i32; records]).unwrap(),
        )
        .unwrap()
        .with_column(
            "g.q",
            ColumnData::scalars(PrimitiveType::Int16, &vec![8i16; records]).unwrap(),
        )
        .unwrap()
        .with_column(
            "g.r",
            ColumnData::scalars(PrimitiveType::Float64, &vec![9f64; records]).unwrap(),
        )
        .unwrap()
}

#[test]
fn test_step_ordering() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = StrategyRegistry::builtin().with_strategy(TracingStrategy { log: log.clone() });
    let diagnostics = CollectedDiagnostics::new();
    let mut table = traced_table(2);
    let mut sink = MemorySink::new();
    let root = sink.root_group();
    TableConverter::new(&registry, &diagnostics)
        .convert(&mut table, &mut sink, root)
        .unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        [
            "convert p",
            "convert g.q",
            "convert g.r",
            "convert p",
            "convert g.q",
            "convert g.r",
            "free g.r",
            "free g.q",
            "free p",
            "type traced double",
            "type traced short",
            "type traced int",
        ]
    );
    assert_eq!(sink.open_type_count(), 0);
    let dataset = sink.find_dataset("traced").unwrap();
    assert_eq!(
        sink.decode_record(dataset, 0).unwrap(),
        json!({ "p": [7], "g": { "q": [8], "r": [9.0] } })
    );
}

/// Delegates to a `MemorySink`, failing the n-th call of one operation.
struct FailingSink {
    inner: MemorySink,
    operation: &'static str,
    remaining: usize,
    fail_close: bool,
}

impl FailingSink {
    fn new(operation: &'static str, fail_at: usize) -> FailingSink {
        FailingSink {
            inner: MemorySink::new(),
            operation,
            remaining: fail_at,
            fail_close: false,
        }
    }

    fn check(&mut self, operation: &str) -> Result<()> {
        if operation != self.operation {
            return Ok(());
        }
        if self.remaining == 0 {
            return Err(Error::resource(operation, "injected failure"));
        }
        self.remaining -= 1;
        Ok(())
    }
}

impl OutputSink for FailingSink {
    fn root_group(&self) -> GroupHandle {
        self.inner.root_group()
    }

    fn create_group(&mut self, parent: GroupHandle, name: &str) -> Result<GroupHandle> {
        self.check("create_group")?;
        self.inner.create_group(parent, name)
    }

    fn close_group(&mut self, group: GroupHandle) -> Result<()> {
        self.inner.close_group(group)
    }

    fn create_compound_type(&mut self, size: usize) -> Result<TypeHandle> {
        self.check("create_compound_type")?;
        self.inner.create_compound_type(size)
    }

    fn create_array_type(&mut self, element: TypeRef, len: usize) -> Result<TypeHandle> {
        self.check("create_array_type")?;
        self.inner.create_array_type(element, len)
    }

    fn create_sequence_type(&mut self, element: TypeRef) -> Result<TypeHandle> {
        self.check("create_sequence_type")?;
        self.inner.create_sequence_type(element)
    }

    fn insert_field(
        &mut self,
        compound: TypeHandle,
        name: &str,
        offset: usize,
        ty: TypeRef,
    ) -> Result<()> {
        self.check("insert_field")?;
        self.inner.insert_field(compound, name, offset, ty)
    }

    fn type_size(&self, ty: TypeRef) -> Result<usize> {
        self.inner.type_size(ty)
    }

    fn close_type(&mut self, ty: TypeHandle) -> Result<()> {
        if self.fail_close {
            return Err(Error::resource("close_type", "injected failure"));
        }
        self.inner.close_type(ty)
    }

    fn create_dataset(
        &mut self,
        group: GroupHandle,
        name: &str,
        ty: TypeRef,
        record_count: usize,
    ) -> Result<DatasetHandle> {
        self.check("create_dataset")?;
        self.inner.create_dataset(group, name, ty, record_count)
    }

    fn write_record(
        &mut self,
        dataset: DatasetHandle,
        index: usize,
        record: RecordView<'_>,
    ) -> Result<()> {
        self.check("write_record")?;
        self.inner.write_record(dataset, index, record)
    }

    fn close_dataset(&mut self, dataset: DatasetHandle) -> Result<()> {
        self.inner.close_dataset(dataset)
    }
}

#[test]
fn test_sink_failures_release_everything() {
    let registry = StrategyRegistry::builtin();
    let diagnostics = CollectedDiagnostics::new();
    let cases = [
        ("create_compound_type", 0),
        ("create_compound_type", 1),
        ("insert_field", 2),
        ("create_sequence_type", 1),
        ("create_dataset", 0),
        ("write_record", 2),
    ];
    for (operation, fail_at) in cases {
        let schema = SchemaNode::group(
            "t",
            vec![
                SchemaNode::leaf("a", "int"),
                SchemaNode::leaf("v", "vector<vector<int> >"),
                SchemaNode::group(
                    "g",
                    vec![SchemaNode::leaf("b", "char"), SchemaNode::leaf("c", "int[2]")],
                ),
            ],
        );
        let records = (0..4)
            .map(|i| json!({ "a": i, "v": [[i]], "g": { "b": 1, "c": [i, i] } }))
            .collect::<Vec<_>>();
        let mut table = MemoryTable::from_json("t", schema, &records).unwrap();
        let mut sink = FailingSink::new(operation, fail_at);
        let root = sink.root_group();
        let err = TableConverter::new(&registry, &diagnostics)
            .convert(&mut table, &mut sink, root)
            .unwrap_err();
        assert!(err.is_resource(), "{operation}: {err}");
        assert_eq!(sink.inner.open_type_count(), 0, "{operation}");
        assert_eq!(sink.inner.open_dataset_count(), 0, "{operation}");
    }
}

#[test]
fn test_sequence_type_cleanup_failure_keeps_error() {
    let mut sink = FailingSink::new("create_sequence_type", 1);
    sink.fail_close = true;
    let ty = TypeName::from("vector<vector<int> >");
    let Err(err) = SequenceStrategy.output_type(&ty, &mut sink) else {
        panic!("expected the second sequence type to fail");
    };
    assert!(matches!(
        err.kind(),
        ErrorKind::Resource { operation, .. } if operation == "create_sequence_type"
    ));
    assert_eq!(sink.inner.open_type_count(), 1);
}

/// A `MemoryTable` whose record loading fails from a given record on.
struct FailingTable {
    inner: MemoryTable,
    fail_from: usize,
}

impl TableSource for FailingTable {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn schema(&self) -> &SchemaNode {
        self.inner.schema()
    }

    fn record_count(&self) -> usize {
        self.inner.record_count()
    }

    fn bind_field(&mut self, path: &FieldPath, target: BindTarget) -> Result<()> {
        self.inner.bind_field(path, target)
    }

    fn load_record(&mut self, index: usize, frame: &mut RecordFrame) -> Result<()> {
        if index >= self.fail_from {
            return Err(Error::invalid_format("record", "corrupted basket"));
        }
        self.inner.load_record(index, frame)
    }
}

#[test]
fn test_source_failure_runs_cleanup() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = StrategyRegistry::builtin().with_strategy(TracingStrategy { log: log.clone() });
    let diagnostics = CollectedDiagnostics::new();
    let mut table = FailingTable {
        inner: traced_table(3),
        fail_from: 1,
    };
    let mut sink = MemorySink::new();
    let root = sink.root_group();
    let err = TableConverter::new(&registry, &diagnostics)
        .convert(&mut table, &mut sink, root)
        .unwrap_err();
    assert!(err.is_source_read());

    let log = log.lock().unwrap();
    assert_eq!(log.iter().filter(|l| l.starts_with("convert")).count(), 3);
    assert_eq!(log.iter().filter(|l| l.starts_with("free")).count(), 3);
    assert_eq!(log.iter().filter(|l| l.starts_with("type")).count(), 3);
    assert_eq!(sink.open_type_count(), 0);
    assert_eq!(sink.open_dataset_count(), 0);
    let dataset = sink.find_dataset("traced").unwrap();
    assert_eq!(sink.written_count(dataset).unwrap(), 1);
}

/// A source that exposes its schema as given, without the checks `MemoryTable` applies.
struct RawTable {
    schema: SchemaNode,
}

impl TableSource for RawTable {
    fn name(&self) -> &str {
        "raw"
    }

    fn schema(&self) -> &SchemaNode {
        &self.schema
    }

    fn record_count(&self) -> usize {
        1
    }

    fn bind_field(&mut self, _path: &FieldPath, _target: BindTarget) -> Result<()> {
        Ok(())
    }

    fn load_record(&mut self, _index: usize, _frame: &mut RecordFrame) -> Result<()> {
        Ok(())
    }
}

#[test]
fn test_dotted_field_name_rejected() {
    let registry = StrategyRegistry::builtin();
    let diagnostics = CollectedDiagnostics::new();
    let mut table = RawTable {
        schema: SchemaNode::group(
            "raw",
            vec![SchemaNode::leaf("x.y", "int"), SchemaNode::leaf("z", "int")],
        ),
    };
    let mut sink = MemorySink::new();
    let root = sink.root_group();
    let err = TableConverter::new(&registry, &diagnostics)
        .convert(&mut table, &mut sink, root)
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
    assert_eq!(sink.dataset_count(), 0);
    assert_eq!(sink.open_type_count(), 0);
}

fn namespace_fixture() -> SourceNamespace {
    let mut root = SourceNamespace::new("file");
    root.add_table(scenario_table("first", 2));
    let mut sub = SourceNamespace::new("run1");
    sub.add_table(scenario_table("second", 3));
    sub.add_table(FailingTable {
        inner: scenario_table("broken", 3),
        fail_from: 2,
    });
    sub.add_table(
        MemoryTable::new(
            "opaque",
            SchemaNode::group("opaque", vec![SchemaNode::leaf("o", "TObject")]),
            1,
        )
        .unwrap(),
    );
    let mut deeper = SourceNamespace::new("calib");
    deeper.add_table(scenario_table("third", 1));
    sub.add_namespace(deeper);
    root.add_namespace(sub);
    root
}

#[test]
fn test_duplicate_entry_names_first_wins() {
    for parallel in [false, true] {
        let registry = StrategyRegistry::builtin();
        let diagnostics = CollectedDiagnostics::new();
        let mut namespace = SourceNamespace::new("file");
        namespace.add_table(scenario_table("raw", 2));
        namespace.add_table(scenario_table("raw", 3));
        namespace.add_namespace(SourceNamespace::new("run1"));
        let mut older = SourceNamespace::new("run1");
        older.add_table(scenario_table("stale", 1));
        namespace.add_namespace(older);

        let shared = SharedSink::new(MemorySink::new());
        let root = shared.root_group();
        let params = ConvertParams {
            parallel,
            ..Default::default()
        };
        let summary = NamespaceConverter::new(TableConverter::new(&registry, &diagnostics), params)
            .convert(&mut namespace, &shared, root)
            .unwrap();
        assert_eq!(summary.converted.len(), 1);
        assert_eq!(summary.converted[0].records, 2);
        assert_eq!(summary.skipped, ["raw"]);
        assert_eq!(
            diagnostics.count(|d| matches!(d, Diagnostic::DuplicateEntry { .. })),
            2
        );

        let sink = shared.into_inner().unwrap();
        assert_eq!(sink.dataset_count(), 1);
        let dataset = sink.find_dataset("raw").unwrap();
        assert_eq!(sink.written_count(dataset).unwrap(), 2);
        assert!(sink.find_dataset("run1/stale").is_none());
    }
}

fn run_namespace(params: ConvertParams) -> (Result<Vec<String>>, MemorySink, Vec<Value>) {
    let registry = StrategyRegistry::builtin();
    let diagnostics = CollectedDiagnostics::new();
    let mut namespace = namespace_fixture();
    let shared = SharedSink::new(MemorySink::new());
    let root = shared.root_group();
    let result = NamespaceConverter::new(TableConverter::new(&registry, &diagnostics), params)
        .convert(&mut namespace, &shared, root)
        .map(|summary| {
            assert_eq!(summary.skipped, ["opaque"]);
            assert_eq!(summary.failed.len(), 1);
            assert_eq!(summary.failed[0].table, "broken");
            let mut converted = summary
                .converted
                .iter()
                .map(|r| r.table.clone())
                .collect::<Vec<_>>();
            converted.sort();
            converted
        });
    let sink = shared.into_inner().unwrap();
    let exported = sink
        .export()
        .unwrap()
        .groups
        .iter()
        .map(|g| serde_json::to_value(g).unwrap())
        .collect();
    (result, sink, exported)
}

#[test]
fn test_namespace_skip_policy() {
    let params = ConvertParams {
        error_policy: TableErrorPolicy::Skip,
        parallel: false,
    };
    let (result, sink, exported) = run_namespace(params);
    assert_eq!(result.unwrap(), ["first", "second", "third"]);
    assert_eq!(
        sink.dataset_paths(),
        ["first", "run1/second", "run1/broken", "run1/calib/third"]
    );
    assert_eq!(sink.open_group_count(), 0);
    assert_eq!(sink.open_type_count(), 0);
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0]["name"], "run1");
    assert_eq!(exported[0]["groups"][0]["name"], "calib");
}

#[test]
fn test_namespace_abort_policy() {
    let (result, sink, _) = run_namespace(ConvertParams::default());
    assert!(result.unwrap_err().is_source_read());
    assert_eq!(sink.dataset_paths(), ["first", "run1/second", "run1/broken"]);
    assert_eq!(sink.open_group_count(), 0);
    assert_eq!(sink.open_type_count(), 0);
    assert_eq!(sink.open_dataset_count(), 0);
}

#[test]
fn test_namespace_parallel() {
    let params = ConvertParams {
        error_policy: TableErrorPolicy::Skip,
        parallel: true,
    };
    let (result, sink, _) = run_namespace(params);
    assert_eq!(result.unwrap(), ["first", "second", "third"]);
    let mut paths = sink.dataset_paths();
    paths.sort();
    assert_eq!(
        paths,
        ["first", "run1/broken", "run1/calib/third", "run1/second"]
    );
    let third = sink.find_dataset("run1/calib/third").unwrap();
    assert_eq!(
        sink.decode_record(third, 0).unwrap(),
        json!({ "a": 0, "b": 0.0, "c": { "leaf_1": 0, "leaf_2": true } })
    );
    assert_eq!(sink.open_group_count(), 0);
    assert_eq!(sink.open_type_count(), 0);
}
