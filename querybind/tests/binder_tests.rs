//! Batched relation binding against the in-memory engine

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use querybind::{
    BindError, ColumnRef, ConditionNode, FieldBinder, MemoryEngine, MiddleTable, Properties,
    RelationLink, Row, Value,
};

#[derive(Properties, Default, Debug, Clone, PartialEq)]
struct Employee {
    id: i64,
    name: String,
    dept_id: Option<i64>,
    dept_name: Option<String>,
    role_name: Option<String>,
}

#[derive(Properties, Default, Debug, Clone, PartialEq)]
struct LineItem {
    region: String,
    sku: String,
    price: Option<f64>,
}

fn employee(id: i64, dept_id: Option<i64>) -> Employee {
    Employee {
        id,
        name: format!("e{}", id),
        dept_id,
        ..Default::default()
    }
}

fn engine() -> MemoryEngine {
    MemoryEngine::new()
        .with_table(
            "dept",
            vec![
                Row::new().with("id", 10).with("name", "Eng").with("active", true),
                Row::new().with("id", 20).with("name", "Ops").with("active", false),
            ],
        )
        .with_table(
            "user_role",
            vec![
                Row::new().with("user_id", 1).with("role_id", 100),
                Row::new().with("user_id", 2).with("role_id", 200),
            ],
        )
        .with_table(
            "role",
            vec![
                Row::new().with("id", 100).with("name", "admin"),
                Row::new().with("id", 200).with("name", "viewer"),
            ],
        )
}

fn dept_link() -> RelationLink {
    RelationLink::new("dept")
        .join("dept_id", "id")
        .link("name", "dept_name")
}

fn role_link() -> RelationLink {
    RelationLink::new("role")
        .join("id", "id")
        .middle(MiddleTable::new("user_role", "user_id", "role_id"))
        .link("name", "role_name")
}

#[tokio::test]
async fn test_binds_department_names_in_one_lookup() {
    let engine = engine();
    let mut employees = vec![
        employee(1, Some(10)),
        employee(2, Some(20)),
        employee(3, Some(10)),
        employee(4, None),
    ];

    let bound = FieldBinder::new(&engine)
        .bind(&mut employees, &dept_link())
        .await
        .unwrap();

    assert_eq!(bound, 3);
    let names: Vec<Option<&str>> = employees.iter().map(|e| e.dept_name.as_deref()).collect();
    assert_eq!(names, vec![Some("Eng"), Some("Ops"), Some("Eng"), None]);

    let log = engine.query_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].table, "dept");
    assert_eq!(
        log[0].condition,
        ConditionNode::in_values(ColumnRef::new("id"), vec![Value::Int(10), Value::Int(20)])
    );
    assert_eq!(
        log[0].projection,
        vec![ColumnRef::new("id"), ColumnRef::new("name")]
    );
}

#[tokio::test]
async fn test_unmatched_owner_is_left_untouched() {
    let engine = engine();
    let mut employees = vec![employee(1, Some(10)), employee(2, Some(99))];
    let before = employees[1].clone();

    let bound = FieldBinder::new(&engine)
        .bind(&mut employees, &dept_link())
        .await
        .unwrap();

    assert_eq!(bound, 1);
    assert_eq!(employees[1], before);
}

#[tokio::test]
async fn test_link_filter_limits_related_rows() {
    let engine = engine();
    let mut employees = vec![employee(1, Some(10)), employee(2, Some(20))];
    let link = dept_link().filter(ConditionNode::eq(ColumnRef::new("active"), true));

    let bound = FieldBinder::new(&engine)
        .bind(&mut employees, &link)
        .await
        .unwrap();

    assert_eq!(bound, 1);
    assert_eq!(employees[0].dept_name.as_deref(), Some("Eng"));
    assert_eq!(employees[1].dept_name, None);
}

#[tokio::test]
async fn test_binds_through_middle_table() {
    let engine = engine();
    let mut users = vec![employee(1, None), employee(2, None), employee(3, None)];

    let bound = FieldBinder::new(&engine)
        .bind(&mut users, &role_link())
        .await
        .unwrap();

    assert_eq!(bound, 2);
    let roles: Vec<Option<&str>> = users.iter().map(|u| u.role_name.as_deref()).collect();
    assert_eq!(roles, vec![Some("admin"), Some("viewer"), None]);
    assert_eq!(engine.queries_for("user_role"), 1);
    assert_eq!(engine.queries_for("role"), 1);
}

#[tokio::test]
async fn test_no_owners_issues_no_queries() {
    let engine = engine();
    let mut none: Vec<Employee> = Vec::new();

    let binder = FieldBinder::new(&engine);
    assert_eq!(binder.bind(&mut none, &dept_link()).await.unwrap(), 0);
    assert_eq!(binder.bind(&mut none, &role_link()).await.unwrap(), 0);
    assert!(engine.query_log().is_empty());
}

#[tokio::test]
async fn test_null_join_values_issue_no_queries() {
    let engine = engine();
    let mut employees = vec![employee(1, None), employee(2, None)];

    let bound = FieldBinder::new(&engine)
        .bind(&mut employees, &dept_link())
        .await
        .unwrap();

    assert_eq!(bound, 0);
    assert!(engine.query_log().is_empty());
}

#[tokio::test]
async fn test_multi_column_middle_table_is_rejected_before_querying() {
    let engine = engine();
    let mut users = vec![employee(1, None)];
    let link = RelationLink::new("role")
        .join("id", "id")
        .middle(MiddleTable::new("user_role", "user_id", "role_id").map("org_id", "org_id"))
        .link("name", "role_name");

    let result = FieldBinder::new(&engine).bind(&mut users, &link).await;

    assert_matches!(result, Err(BindError::InvalidUsage(_)));
    assert!(engine.query_log().is_empty());
    assert_eq!(users[0].role_name, None);
}

#[tokio::test]
async fn test_composite_join_key() {
    let engine = MemoryEngine::new().with_table(
        "price",
        vec![
            Row::new().with("region", "eu").with("sku", "a").with("amount", 1.5),
            Row::new().with("region", "us").with("sku", "a").with("amount", 2.0),
            Row::new().with("region", "eu").with("sku", "b").with("amount", 3.25),
        ],
    );
    let mut items = vec![
        LineItem {
            region: "us".into(),
            sku: "a".into(),
            price: None,
        },
        LineItem {
            region: "eu".into(),
            sku: "b".into(),
            price: None,
        },
        LineItem {
            region: "us".into(),
            sku: "b".into(),
            price: None,
        },
    ];
    let link = RelationLink::new("price")
        .join("region", "region")
        .join("sku", "sku")
        .link("amount", "price");

    let bound = FieldBinder::new(&engine).bind(&mut items, &link).await.unwrap();

    assert_eq!(bound, 2);
    let prices: Vec<Option<f64>> = items.iter().map(|i| i.price).collect();
    assert_eq!(prices, vec![Some(2.0), Some(3.25), None]);
    assert_eq!(engine.queries_for("price"), 1);
}

#[tokio::test]
async fn test_bind_all_validates_every_link_first() {
    let engine = engine();
    let mut employees = vec![employee(1, Some(10)), employee(2, Some(20))];

    let broken = RelationLink::new("dept").join("dept_id", "id");
    let result = FieldBinder::new(&engine)
        .bind_all(&mut employees, &[dept_link(), broken])
        .await;
    assert_matches!(result, Err(BindError::InvalidUsage(_)));
    assert!(engine.query_log().is_empty());

    let total = FieldBinder::new(&engine)
        .bind_all(&mut employees, &[dept_link(), role_link()])
        .await
        .unwrap();
    assert_eq!(total, 4);
    assert_eq!(employees[0].dept_name.as_deref(), Some("Eng"));
    assert_eq!(employees[1].role_name.as_deref(), Some("viewer"));
}

#[tokio::test]
async fn test_related_field_names_map_to_columns() {
    let engine = MemoryEngine::new().with_table(
        "dept",
        vec![Row::new().with("id", 10).with("dept_name", "Eng")],
    );
    let mut employees = vec![employee(1, Some(10))];
    let link = RelationLink::new("dept")
        .join("dept_id", "id")
        .link("deptName", "dept_name");

    let bound = FieldBinder::new(&engine)
        .bind(&mut employees, &link)
        .await
        .unwrap();

    assert_eq!(bound, 1);
    assert_eq!(employees[0].dept_name.as_deref(), Some("Eng"));
    assert_eq!(
        engine.query_log()[0].projection,
        vec![ColumnRef::new("id"), ColumnRef::new("dept_name")]
    );
}
