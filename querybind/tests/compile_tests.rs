//! Compiling derived transfer objects into condition trees

use std::sync::Arc;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use querybind::{
    AesProtectHandler, BindError, ColumnRef, ConditionNode, Config, Entity, MemoryEngine, MetaCache,
    Operator, Pagination, Properties, ProtectFieldHandler, QueryCompiler, QueryDto, QueryService,
    Row, Value,
};

#[allow(dead_code)]
#[derive(Entity)]
#[entity(table = "employee")]
struct Employee {
    id: i64,
    name: String,
    age: i64,
    dept_id: i64,
    #[entity(protect)]
    phone: String,
}

#[allow(dead_code)]
#[derive(Entity)]
#[entity(table = "dept")]
struct Dept {
    id: i64,
    name: String,
}

#[derive(QueryDto, Default)]
#[query(entity = Employee)]
struct EmployeeQuery {
    #[bind_query(comparison = Contains)]
    name: Option<String>,
    age: Option<i64>,
    #[bind_query(comparison = In, field = "dept_id")]
    dept_ids: Vec<i64>,
    #[bind_query(comparison = Between, field = "age")]
    age_range: Vec<i64>,
    #[bind_query(comparison = StartsWith, field = "name")]
    #[bind_query(comparison = EndsWith, field = "name")]
    name_edge: Option<String>,
    phone: Option<String>,
    #[bind_query(entity = Dept, field = "name", condition = "this.dept_id = id")]
    dept_name: Option<String>,
    #[query(skip)]
    #[allow(dead_code)]
    scratch: Option<String>,
}

#[derive(QueryDto, Default)]
#[query(table = "employee")]
struct StatusQuery {
    #[query(getter = "default_status")]
    status: Option<i32>,
    #[query(logic_delete = 1)]
    deleted: i32,
}

impl StatusQuery {
    fn default_status(&self) -> i32 {
        1
    }
}

#[derive(QueryDto, Default)]
#[query(table = "employee")]
struct DanglingJoinQuery {
    #[bind_query(condition = "this.dept_id = id")]
    dept_name: Option<String>,
}

#[derive(QueryDto, Default)]
#[query(table = "employee")]
struct OperatorQuery {
    #[bind_query(strategy = IncludeNull)]
    manager_id: Option<i64>,
    #[bind_query(comparison = NotEq, strategy = IncludeNull, field = "boss_id")]
    has_boss: Option<i64>,
    #[bind_query(strategy = IncludeEmpty)]
    nickname: Option<String>,
    #[bind_query(comparison = NotEq, field = "status")]
    not_status: Option<i32>,
    #[bind_query(comparison = NotIn, field = "dept_id")]
    excluded_depts: Vec<i64>,
    #[bind_query(comparison = Gt, field = "age")]
    older_than: Option<i64>,
    #[bind_query(comparison = Ge, field = "age")]
    min_age: Option<i64>,
    #[bind_query(comparison = Lt, field = "age")]
    younger_than: Option<i64>,
    #[bind_query(comparison = Le, field = "age")]
    max_age: Option<i64>,
    #[bind_query(comparison = Like, field = "name")]
    name_like: Option<String>,
    #[bind_query(comparison = BetweenBegin, field = "hired")]
    hired_from: Option<String>,
    #[bind_query(comparison = BetweenEnd, field = "hired")]
    hired_to: Option<String>,
    #[bind_query(comparison = In, field = "dept_id")]
    dept_scalar: Option<i64>,
}

#[allow(dead_code)]
#[derive(Entity)]
struct Addr {
    id: i64,
    line2: String,
    addr2_line: String,
}

#[derive(QueryDto, Default)]
#[query(entity = Addr)]
struct AddrQuery {
    line2: Option<String>,
    #[bind_query(field = "addr2Line")]
    second_line: Option<String>,
}

#[derive(Properties, Default, Debug, PartialEq)]
struct EmployeeRow {
    id: i64,
    name: String,
    age: Option<i64>,
}

fn compile(dto: &EmployeeQuery) -> ConditionNode {
    QueryCompiler::new().compile(dto, None, None).unwrap().condition
}

#[test]
fn test_empty_dto_compiles_to_empty_condition() {
    let compiled = QueryCompiler::new()
        .compile(&EmployeeQuery::default(), None, None)
        .unwrap();
    assert!(compiled.condition.is_empty());
    assert!(!compiled.is_join());
    assert_eq!(compiled.table, "employee");
}

#[test]
fn test_empty_string_is_ignored() {
    let dto = EmployeeQuery {
        name: Some(String::new()),
        age: Some(30),
        ..Default::default()
    };
    assert_eq!(compile(&dto), ConditionNode::eq(ColumnRef::new("age"), 30));
}

#[test]
fn test_single_element_in_degrades_to_eq() {
    let one = EmployeeQuery {
        dept_ids: vec![5],
        ..Default::default()
    };
    assert_eq!(compile(&one), ConditionNode::eq(ColumnRef::new("dept_id"), 5));

    let many = EmployeeQuery {
        dept_ids: vec![5, 6],
        ..Default::default()
    };
    assert_eq!(
        compile(&many),
        ConditionNode::leaf(
            ColumnRef::new("dept_id"),
            Operator::In,
            Value::List(vec![Value::Int(5), Value::Int(6)])
        )
    );
}

#[test]
fn test_between_bounds() {
    let both = EmployeeQuery {
        age_range: vec![20, 30],
        ..Default::default()
    };
    assert_eq!(
        compile(&both),
        ConditionNode::leaf(
            ColumnRef::new("age"),
            Operator::Between,
            Value::List(vec![Value::Int(20), Value::Int(30)])
        )
    );

    let lower = EmployeeQuery {
        age_range: vec![20],
        ..Default::default()
    };
    assert_eq!(
        compile(&lower),
        ConditionNode::leaf(ColumnRef::new("age"), Operator::Ge, 20)
    );
}

#[test]
fn test_multiple_rules_form_or_group() {
    let dto = EmployeeQuery {
        name_edge: Some("An".into()),
        ..Default::default()
    };
    assert_eq!(
        compile(&dto),
        ConditionNode::or([
            ConditionNode::leaf(ColumnRef::new("name"), Operator::Like, "An%"),
            ConditionNode::leaf(ColumnRef::new("name"), Operator::Like, "%An"),
        ])
    );
}

#[test]
fn test_join_field_qualifies_columns() {
    let dto = EmployeeQuery {
        age: Some(30),
        dept_name: Some("Eng".into()),
        ..Default::default()
    };
    let compiled = QueryCompiler::new().compile(&dto, None, None).unwrap();

    assert!(compiled.is_join());
    assert_eq!(
        compiled.condition,
        ConditionNode::and([
            ConditionNode::eq(ColumnRef::qualified("self", "age"), 30),
            ConditionNode::leaf(ColumnRef::qualified("r1", "name"), Operator::Like, "%Eng%"),
        ])
    );

    let plan = compiled.join_plan.as_ref().unwrap();
    assert_eq!(plan.aliases(), vec!["r1"]);
    let clause = plan.clause("r1").unwrap();
    assert_eq!(clause.table, "dept");
    assert_eq!(clause.entity.as_deref(), Some("Dept"));

    let select = compiled.to_select();
    assert!(select.distinct);
    assert_eq!(select.joins.len(), 1);
}

#[test]
fn test_unused_join_stays_flat() {
    let dto = EmployeeQuery {
        age: Some(30),
        dept_name: Some("Eng".into()),
        ..Default::default()
    };
    let compiled = QueryCompiler::new()
        .compile(&dto, Some(&["age"]), None)
        .unwrap();
    assert!(!compiled.is_join());
    assert_eq!(compiled.condition, ConditionNode::eq(ColumnRef::new("age"), 30));
}

#[test]
fn test_protected_field_is_encrypted() {
    let handler = Arc::new(AesProtectHandler::new(&[7u8; 32]).unwrap());
    let compiler = QueryCompiler::new().with_protector(handler.clone());

    let dto = EmployeeQuery {
        name: Some("Ann".into()),
        phone: Some("555-0100".into()),
        ..Default::default()
    };
    let expected_phone = handler.encrypt("Employee", "phone", "555-0100").unwrap();
    assert_ne!(expected_phone, "555-0100");

    assert_eq!(
        compiler.compile(&dto, None, None).unwrap().condition,
        ConditionNode::and([
            ConditionNode::leaf(ColumnRef::new("name"), Operator::Like, "%Ann%"),
            ConditionNode::eq(ColumnRef::new("phone"), expected_phone),
        ])
    );
}

#[test]
fn test_getter_fills_empty_field() {
    let dto = StatusQuery {
        status: None,
        deleted: 1,
    };
    assert_eq!(
        QueryCompiler::new().compile(&dto, None, None).unwrap().condition,
        ConditionNode::eq(ColumnRef::new("status"), 1)
    );

    let explicit = StatusQuery {
        status: Some(3),
        deleted: 0,
    };
    assert_eq!(
        QueryCompiler::new()
            .compile(&explicit, None, None)
            .unwrap()
            .condition,
        ConditionNode::and([
            ConditionNode::eq(ColumnRef::new("status"), 3),
            ConditionNode::eq(ColumnRef::new("deleted"), 0),
        ])
    );
}

#[test]
fn test_condition_without_entity_is_rejected() {
    let result = QueryCompiler::new().compile(&DanglingJoinQuery::default(), None, None);
    assert_matches!(result, Err(BindError::InvalidUsage(_)));
}

#[test]
fn test_derived_metadata() {
    let cache = MetaCache::global();
    let specs = cache.bind_specs::<EmployeeQuery>().unwrap();
    assert_eq!(specs.len(), 6);
    assert!(cache.has_join_table::<EmployeeQuery>(&["dept_name"]).unwrap());
    assert!(!cache.has_join_table::<EmployeeQuery>(&["name", "age"]).unwrap());
    assert!(cache.protected_fields("Employee").contains("phone"));

    let descriptor = EmployeeQuery::describe();
    let scratch = descriptor.fields.iter().find(|f| f.name == "scratch").unwrap();
    assert!(scratch.transient);
    assert_eq!(Employee::entity_info().column_for("dept_id"), Some("dept_id"));
}

#[test]
fn test_derived_properties() {
    let mut row = EmployeeRow::default();
    assert!(row.set_property("name", Value::from("Ann")).is_ok());
    assert!(row.set_property("age", Value::Int(41)).is_ok());
    assert!(row.set_property("missing", Value::Int(1)).is_err());
    assert_eq!(row.get_property("age").unwrap(), Value::Int(41));
    assert_eq!(EmployeeRow::property_names(), &["id", "name", "age"]);
}

#[test]
fn test_pagination_pages_select() {
    let dto = EmployeeQuery {
        age: Some(30),
        ..Default::default()
    };
    let page = Pagination::new(3, 10).order_by("name:DESC");
    let select = QueryCompiler::new()
        .compile(&dto, None, Some(&page))
        .unwrap()
        .to_select();
    assert_eq!(select.limit, Some(10));
    assert_eq!(select.offset, Some(20));
    assert_eq!(select.order.len(), 1);
}

#[tokio::test]
async fn test_service_lists_over_memory_engine() {
    let engine = MemoryEngine::new()
        .with_table(
            "employee",
            vec![
                Row::new().with("id", 1).with("name", "Ann").with("age", 30).with("dept_id", 10),
                Row::new().with("id", 2).with("name", "Dana").with("age", 30).with("dept_id", 20),
                Row::new().with("id", 3).with("name", "Bob").with("age", 30).with("dept_id", 10),
                Row::new().with("id", 4).with("name", "Cy").with("age", 52).with("dept_id", 10),
            ],
        )
        .with_table(
            "dept",
            vec![
                Row::new().with("id", 10).with("name", "Engineering"),
                Row::new().with("id", 20).with("name", "Ops"),
            ],
        );
    let service = QueryService::new(engine, &Config::default()).unwrap();

    let dto = EmployeeQuery {
        age: Some(30),
        dept_name: Some("eng".into()),
        ..Default::default()
    };
    let mut page = Pagination::new(1, 1).order_by("name:ASC");
    let rows: Vec<EmployeeRow> = service.list(&dto, None, Some(&mut page)).await.unwrap();

    assert_eq!(page.total_count, Some(2));
    assert_eq!(page.total_pages(), Some(2));
    assert_eq!(
        rows,
        vec![EmployeeRow {
            id: 1,
            name: "Ann".into(),
            age: Some(30),
        }]
    );
    assert_eq!(service.count(&dto, None).await.unwrap(), 2);
}

/// Compile `dto` with only `field` considered.
fn compile_only(dto: &OperatorQuery, field: &str) -> ConditionNode {
    QueryCompiler::new()
        .compile(dto, Some(&[field]), None)
        .unwrap()
        .condition
}

#[test]
fn test_include_null_compiles_null_checks() {
    let dto = OperatorQuery::default();
    assert_eq!(
        compile_only(&dto, "manager_id"),
        ConditionNode::is_null(ColumnRef::new("manager_id"))
    );
    assert_eq!(
        compile_only(&dto, "has_boss"),
        ConditionNode::leaf(ColumnRef::new("boss_id"), Operator::IsNotNull, Value::Null)
    );

    let set = OperatorQuery {
        manager_id: Some(7),
        has_boss: Some(8),
        ..Default::default()
    };
    assert_eq!(
        compile_only(&set, "manager_id"),
        ConditionNode::eq(ColumnRef::new("manager_id"), 7)
    );
    assert_eq!(
        compile_only(&set, "has_boss"),
        ConditionNode::leaf(ColumnRef::new("boss_id"), Operator::Ne, 8)
    );
}

#[test]
fn test_include_empty_keeps_empty_string() {
    let empty = OperatorQuery {
        nickname: Some(String::new()),
        ..Default::default()
    };
    assert_eq!(
        compile_only(&empty, "nickname"),
        ConditionNode::eq(ColumnRef::new("nickname"), "")
    );
    assert!(compile_only(&OperatorQuery::default(), "nickname").is_empty());
}

#[test]
fn test_negated_comparisons() {
    let dto = OperatorQuery {
        not_status: Some(2),
        excluded_depts: vec![5],
        ..Default::default()
    };
    assert_eq!(
        compile_only(&dto, "not_status"),
        ConditionNode::leaf(ColumnRef::new("status"), Operator::Ne, 2)
    );
    assert_eq!(
        compile_only(&dto, "excluded_depts"),
        ConditionNode::leaf(ColumnRef::new("dept_id"), Operator::Ne, 5)
    );

    let many = OperatorQuery {
        excluded_depts: vec![5, 6],
        ..Default::default()
    };
    assert_eq!(
        compile_only(&many, "excluded_depts"),
        ConditionNode::leaf(
            ColumnRef::new("dept_id"),
            Operator::NotIn,
            Value::List(vec![Value::Int(5), Value::Int(6)])
        )
    );
}

#[test]
fn test_ordering_comparisons() {
    let dto = OperatorQuery {
        older_than: Some(20),
        min_age: Some(21),
        younger_than: Some(60),
        max_age: Some(59),
        ..Default::default()
    };
    for (field, op, value) in [
        ("older_than", Operator::Gt, 20),
        ("min_age", Operator::Ge, 21),
        ("younger_than", Operator::Lt, 60),
        ("max_age", Operator::Le, 59),
    ] {
        assert_eq!(
            compile_only(&dto, field),
            ConditionNode::leaf(ColumnRef::new("age"), op, value),
            "{}",
            field
        );
    }
}

#[test]
fn test_like_and_half_open_ranges() {
    let dto = OperatorQuery {
        name_like: Some("An".into()),
        hired_from: Some("2020-01-01".into()),
        hired_to: Some("2020-12-31".into()),
        ..Default::default()
    };
    assert_eq!(
        compile_only(&dto, "name_like"),
        ConditionNode::leaf(ColumnRef::new("name"), Operator::Like, "%An%")
    );
    assert_eq!(
        compile_only(&dto, "hired_from"),
        ConditionNode::leaf(ColumnRef::new("hired"), Operator::Ge, "2020-01-01")
    );
    assert_eq!(
        compile_only(&dto, "hired_to"),
        ConditionNode::leaf(ColumnRef::new("hired"), Operator::Le, "2020-12-31")
    );
}

#[test]
fn test_scalar_for_set_comparison_is_skipped() {
    let dto = OperatorQuery {
        dept_scalar: Some(5),
        ..Default::default()
    };
    assert!(compile_only(&dto, "dept_scalar").is_empty());
}

#[test]
fn test_digit_names_keep_their_column() {
    let info = Addr::entity_info();
    assert_eq!(info.table, "addr");
    assert_eq!(info.column_for("line2"), Some("line2"));
    assert_eq!(info.column_for("addr2_line"), Some("addr2_line"));

    let dto = AddrQuery {
        line2: Some("x".into()),
        second_line: Some("y".into()),
    };
    assert_eq!(
        QueryCompiler::new().compile(&dto, None, None).unwrap().condition,
        ConditionNode::and([
            ConditionNode::eq(ColumnRef::new("line2"), "x"),
            ConditionNode::eq(ColumnRef::new("addr2_line"), "y"),
        ])
    );
}

#[test]
fn test_service_uses_configured_protection() {
    let key = AesProtectHandler::generate_key();
    let config = Config {
        enable_data_protect: true,
        protect_key: Some(key.clone()),
        ..Default::default()
    };
    let service = QueryService::new(MemoryEngine::new(), &config).unwrap();

    let dto = EmployeeQuery {
        phone: Some("555-0100".into()),
        ..Default::default()
    };
    let expected = AesProtectHandler::from_base64(&key)
        .unwrap()
        .encrypt("Employee", "phone", "555-0100")
        .unwrap();
    assert_eq!(
        service.compile(&dto, None, None).unwrap().condition,
        ConditionNode::eq(ColumnRef::new("phone"), expected)
    );
}
