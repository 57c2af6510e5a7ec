//! Compiled queries executed against a file-backed SQLite database

#![cfg(feature = "sqlite")]

use pretty_assertions::assert_eq;
use querybind::{
    Config, Entity, FieldBinder, Pagination, Properties, QueryCompiler, QueryDto, QueryEngine,
    QueryService, RelationLink, SqliteEngine, Value,
};
use tempfile::TempDir;

#[allow(dead_code)]
#[derive(Entity)]
#[entity(table = "employee")]
struct Employee {
    id: i64,
    name: String,
    age: i64,
    dept_id: i64,
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
    #[bind_query(comparison = Ge)]
    age: Option<i64>,
    #[bind_query(comparison = In, field = "id")]
    ids: Vec<i64>,
    #[bind_query(entity = Dept, field = "name", condition = "this.dept_id = id")]
    dept_name: Option<String>,
}

#[derive(Properties, Default, Debug, PartialEq)]
struct EmployeeRow {
    id: i64,
    name: String,
    dept_id: Option<i64>,
    dept_name: Option<String>,
}

async fn setup() -> (TempDir, SqliteEngine) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("querybind.db").display());
    let engine = SqliteEngine::connect_url(&url, 2).await.unwrap();

    for statement in [
        "CREATE TABLE dept (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        "CREATE TABLE employee (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER, dept_id INTEGER)",
        "INSERT INTO dept (id, name) VALUES (10, 'Engineering'), (20, 'Operations')",
        "INSERT INTO employee (id, name, age, dept_id) VALUES \
            (1, 'Ann', 30, 10), (2, 'Dana', 41, 20), (3, 'Bob', 25, 10), (4, 'Cy', 52, NULL)",
    ] {
        engine.execute(statement).await.unwrap();
    }

    (dir, engine)
}

fn names(rows: &[querybind::Row]) -> Vec<String> {
    rows.iter()
        .map(|r| r.get("name").map(Value::to_key_string).unwrap_or_default())
        .collect()
}

#[tokio::test]
async fn test_flat_query() {
    let (_dir, engine) = setup().await;
    let dto = EmployeeQuery {
        name: Some("an".into()),
        age: Some(35),
        ..Default::default()
    };
    let select = QueryCompiler::new().compile(&dto, None, None).unwrap().to_select();

    let rows = engine.query(&select).await.unwrap();
    assert_eq!(names(&rows), vec!["Dana"]);
    assert_eq!(engine.count(&select).await.unwrap(), 1);
}

#[tokio::test]
async fn test_in_query() {
    let (_dir, engine) = setup().await;
    let dto = EmployeeQuery {
        ids: vec![1, 3, 99],
        ..Default::default()
    };
    let page = Pagination::default().order_by("name:ASC");
    let select = QueryCompiler::new()
        .compile(&dto, None, Some(&page))
        .unwrap()
        .to_select();

    let rows = engine.query(&select).await.unwrap();
    assert_eq!(names(&rows), vec!["Ann", "Bob"]);
}

#[tokio::test]
async fn test_joined_query() {
    let (_dir, engine) = setup().await;
    let dto = EmployeeQuery {
        dept_name: Some("eng".into()),
        ..Default::default()
    };
    let compiled = QueryCompiler::new().compile(&dto, None, None).unwrap();
    assert!(compiled.is_join());

    let select = compiled.to_select();
    let mut rows = names(&engine.query(&select).await.unwrap());
    rows.sort();
    assert_eq!(rows, vec!["Ann", "Bob"]);
    assert_eq!(engine.count(&select).await.unwrap(), 2);
}

#[tokio::test]
async fn test_service_pages_and_binds() {
    let (_dir, engine) = setup().await;
    let service = QueryService::new(engine, &Config::default()).unwrap();

    let mut page = Pagination::new(2, 2).order_by("age:DESC");
    let mut rows: Vec<EmployeeRow> = service
        .list(&EmployeeQuery::default(), None, Some(&mut page))
        .await
        .unwrap();

    assert_eq!(page.total_count, Some(4));
    assert_eq!(
        rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        vec!["Ann", "Bob"]
    );

    let link = RelationLink::new("dept").join("dept_id", "id").link("name", "dept_name");
    let bound = FieldBinder::new(service.engine())
        .bind(&mut rows, &link)
        .await
        .unwrap();
    assert_eq!(bound, 2);
    assert!(rows.iter().all(|r| r.dept_name.as_deref() == Some("Engineering")));
}
