//! Integration tests for ManyToOne / OneToMany loading.

mod common;

use common::{Department, Employee, RecordingFactory, create_schema, sqlite_factory};
use entity_dao::dialect::SqliteDialect;
use entity_dao::{Collection, Dao, DaoResult, Entity, EntityDecl, Reference, SqlValue, ValueKind};
use std::sync::Arc;

/// Tree node pointing at its own type in both directions.
#[derive(Debug, Default)]
struct Node {
    id: Option<i64>,
    name: String,
    parent_id: Option<i64>,
    parent: Reference<Node>,
    children: Collection<Node>,
}

impl Node {
    fn new(name: &str, parent_id: Option<i64>) -> Self {
        Self {
            name: name.to_string(),
            parent_id,
            ..Default::default()
        }
    }
}

impl Entity for Node {
    fn declare() -> EntityDecl<Self> {
        EntityDecl::<Self>::new()
            .table("node", &["id"])
            .field("id", ValueKind::Int)
            .field("name", ValueKind::Text)
            .column("parentId", "parent_id", ValueKind::Int)
            .many_to_one::<Node>("parent", &["parentId"], |n| &mut n.parent)
            .lazy()
            .one_to_many::<Node>("children", &["parentId"], |n| &mut n.children)
            .order_by("name")
            .lazy()
    }

    fn value(&self, field: &str) -> SqlValue {
        match field {
            "id" => self.id.into(),
            "name" => self.name.as_str().into(),
            "parentId" => self.parent_id.into(),
            _ => SqlValue::Null,
        }
    }

    fn assign(&mut self, field: &str, value: SqlValue) -> DaoResult<()> {
        match field {
            "id" => self.id = value.decode(field)?,
            "name" => self.name = value.decode(field)?,
            "parentId" => self.parent_id = value.decode(field)?,
            _ => {}
        }
        Ok(())
    }
}

/// Keyed by (country, code); the database generates nothing.
#[derive(Debug, Default)]
struct Region {
    country: String,
    code: String,
    name: String,
    offices: Collection<Office>,
}

impl Entity for Region {
    fn declare() -> EntityDecl<Self> {
        EntityDecl::<Self>::new()
            .table("region", &["country", "code"])
            .auto_generate_keys(false)
            .field("country", ValueKind::Text)
            .field("code", ValueKind::Text)
            .field("name", ValueKind::Text)
            .one_to_many::<Office>("offices", &["regionCountry", "regionCode"], |r| &mut r.offices)
            .order_by("city")
    }

    fn value(&self, field: &str) -> SqlValue {
        match field {
            "country" => self.country.as_str().into(),
            "code" => self.code.as_str().into(),
            "name" => self.name.as_str().into(),
            _ => SqlValue::Null,
        }
    }

    fn assign(&mut self, field: &str, value: SqlValue) -> DaoResult<()> {
        match field {
            "country" => self.country = value.decode(field)?,
            "code" => self.code = value.decode(field)?,
            "name" => self.name = value.decode(field)?,
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Office {
    id: Option<i64>,
    city: String,
    region_country: String,
    region_code: String,
}

impl Entity for Office {
    fn declare() -> EntityDecl<Self> {
        EntityDecl::<Self>::new()
            .table("office", &["id"])
            .field("id", ValueKind::Int)
            .field("city", ValueKind::Text)
            .column("regionCountry", "region_country", ValueKind::Text)
            .column("regionCode", "region_code", ValueKind::Text)
    }

    fn value(&self, field: &str) -> SqlValue {
        match field {
            "id" => self.id.into(),
            "city" => self.city.as_str().into(),
            "regionCountry" => self.region_country.as_str().into(),
            "regionCode" => self.region_code.as_str().into(),
            _ => SqlValue::Null,
        }
    }

    fn assign(&mut self, field: &str, value: SqlValue) -> DaoResult<()> {
        match field {
            "id" => self.id = value.decode(field)?,
            "city" => self.city = value.decode(field)?,
            "regionCountry" => self.region_country = value.decode(field)?,
            "regionCode" => self.region_code = value.decode(field)?,
            _ => {}
        }
        Ok(())
    }
}

async fn seeded() -> (Dao, Arc<RecordingFactory>, tempfile::NamedTempFile, i64) {
    let (factory, file) = sqlite_factory().await;
    let recorder = Arc::new(RecordingFactory::new(Arc::new(factory)));
    let dao = Dao::new(recorder.clone(), Arc::new(SqliteDialect));
    create_schema(&dao).await;

    let dept = dao.save(Department::new("Engineering")).await.unwrap();
    let dept_id = dept.id.unwrap();
    for (name, salary) in [("Carl", 3.0), ("Alma", 1.0), ("Bo", 2.0)] {
        dao.save(Employee::new(name, salary, Some(dept_id))).await.unwrap();
    }
    dao.save(Employee::new("Solo", 4.0, None)).await.unwrap();
    recorder.clear();
    (dao, recorder, file, dept_id)
}

#[tokio::test]
async fn test_many_to_one_is_loaded_eagerly() {
    let (dao, recorder, _file, dept_id) = seeded().await;

    let carl: Employee = dao.find(&[SqlValue::Int(1)]).await.unwrap().unwrap();
    assert!(carl.department.is_loaded());
    let dept = carl.department.target().unwrap();
    assert_eq!(dept.id, Some(dept_id));
    assert_eq!(dept.name, "Engineering");
    assert_eq!(recorder.count_matching("FROM department WHERE id = ?"), 1);

    // The parent's own lazy collection is not wired without cascading
    assert!(!dept.employees.is_loaded());
    assert!(!dept.employees.is_pending());
}

#[tokio::test]
async fn test_null_foreign_key_means_no_parent() {
    let (dao, recorder, _file, _) = seeded().await;

    let solo: Vec<Employee> = dao.list("WHERE name = ?", &["Solo".into()]).await.unwrap();
    assert_eq!(solo.len(), 1);
    assert!(solo[0].department.is_loaded());
    assert!(solo[0].department.target().is_none());
    assert_eq!(recorder.count_matching("FROM department"), 0);
}

#[tokio::test]
async fn test_lazy_collection_ignored_without_cascading() {
    let (dao, recorder, _file, dept_id) = seeded().await;

    let mut dept: Department = dao.find(&[SqlValue::Int(dept_id)]).await.unwrap().unwrap();
    assert!(dept.employees.load().await.is_none());
    assert!(dept.employees.items().is_empty());
    assert_eq!(recorder.count_matching("FROM employee"), 0);
}

#[tokio::test]
async fn test_lazy_collection_loads_once_on_first_access() {
    let (dao, recorder, _file, dept_id) = seeded().await;
    dao.set_cascading(true);

    let mut dept: Department = dao.find(&[SqlValue::Int(dept_id)]).await.unwrap().unwrap();
    assert!(dept.employees.is_pending());
    assert_eq!(recorder.count_matching("FROM employee"), 0);

    let names: Vec<String> = dept
        .employees
        .load()
        .await
        .unwrap()
        .iter()
        .map(|e| e.name.clone())
        .collect();
    assert_eq!(names, ["Alma", "Bo", "Carl"]);
    assert_eq!(
        recorder.count_matching("FROM employee WHERE dept_id = ? ORDER BY name ASC"),
        1
    );

    assert_eq!(dept.employees.load().await.map(Vec::len), Some(3));
    assert_eq!(recorder.count_matching("FROM employee"), 1);
}

#[tokio::test]
async fn test_eager_failure_is_swallowed() {
    let (dao, _recorder, _file, _) = seeded().await;
    dao.execute_update("ALTER TABLE department RENAME TO department_old", &[])
        .await
        .unwrap();

    let carl: Employee = dao.find(&[SqlValue::Int(1)]).await.unwrap().unwrap();
    assert_eq!(carl.name, "Carl");
    assert!(!carl.department.is_loaded());
    assert!(!carl.department.is_pending());
    assert!(carl.department.failure().is_some());
}

#[tokio::test]
async fn test_cascading_retries_failed_eager_load() {
    let (dao, _recorder, _file, _) = seeded().await;
    dao.set_cascading(true);
    dao.execute_update("ALTER TABLE department RENAME TO department_old", &[])
        .await
        .unwrap();

    let mut carl: Employee = dao.find(&[SqlValue::Int(1)]).await.unwrap().unwrap();
    assert!(carl.department.is_pending());
    assert!(carl.department.load().await.is_none());

    dao.execute_update("ALTER TABLE department_old RENAME TO department", &[])
        .await
        .unwrap();
    let dept = carl.department.load().await.unwrap();
    assert_eq!(dept.as_ref().map(|d| d.name.as_str()), Some("Engineering"));
}

/// root <- mid <- leaf, plus a second child `alt` under root.
async fn tree() -> (Dao, Arc<RecordingFactory>, tempfile::NamedTempFile, i64) {
    let (dao, recorder, file, _) = seeded().await;
    dao.execute_update(
        "CREATE TABLE node (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, parent_id INTEGER)",
        &[],
    )
    .await
    .unwrap();
    let root = dao.save(Node::new("root", None)).await.unwrap();
    let mid = dao.save(Node::new("mid", root.id)).await.unwrap();
    dao.save(Node::new("alt", root.id)).await.unwrap();
    let leaf = dao.save(Node::new("leaf", mid.id)).await.unwrap();
    recorder.clear();
    (dao, recorder, file, leaf.id.unwrap())
}

#[tokio::test]
async fn test_lazy_many_to_one_waits_for_access() {
    let (dao, recorder, _file, leaf_id) = tree().await;

    let leaf: Node = dao.find(&[SqlValue::Int(leaf_id)]).await.unwrap().unwrap();
    assert!(!leaf.parent.is_loaded());
    assert!(!leaf.parent.is_pending());

    dao.set_cascading(true);
    recorder.clear();
    let mut leaf: Node = dao.find(&[SqlValue::Int(leaf_id)]).await.unwrap().unwrap();
    assert!(leaf.parent.is_pending());
    assert_eq!(recorder.count_matching("FROM node"), 1);

    assert_eq!(
        leaf.parent.load().await.unwrap().as_ref().map(|n| n.name.as_str()),
        Some("mid")
    );
    assert_eq!(recorder.count_matching("FROM node"), 2);

    let mid = leaf.parent.get_mut().and_then(Option::as_mut).unwrap();
    assert!(mid.parent.is_pending());
    mid.parent.load().await;
    let root = mid.parent.get_mut().and_then(Option::as_mut).unwrap();
    assert_eq!(root.name, "root");
    // NULL foreign key resolves to no parent without a query
    assert_eq!(root.parent.load().await.map(Option::is_none), Some(true));
    assert_eq!(recorder.count_matching("FROM node"), 3);

    let chain: Vec<&str> = std::iter::successors(Some(&leaf), |n| n.parent.target())
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(chain, ["leaf", "mid", "root"]);
}

#[tokio::test]
async fn test_self_referencing_children() {
    let (dao, recorder, _file, _) = tree().await;
    dao.set_cascading(true);

    let mut roots: Vec<Node> = dao.list("WHERE parent_id IS NULL", &[]).await.unwrap();
    assert_eq!(roots.len(), 1);
    let names: Vec<String> = roots[0]
        .children
        .load()
        .await
        .unwrap()
        .iter()
        .map(|n| n.name.clone())
        .collect();
    assert_eq!(names, ["alt", "mid"]);
    assert_eq!(
        recorder.count_matching("FROM node WHERE parent_id = ? ORDER BY name ASC"),
        1
    );

    let mid = &mut roots[0].children.get_mut().unwrap()[1];
    let grandchildren = mid.children.load().await.unwrap();
    assert_eq!(grandchildren.len(), 1);
    assert_eq!(grandchildren[0].name, "leaf");
}

#[tokio::test]
async fn test_one_to_many_over_composite_key() {
    let (dao, recorder, _file, _) = seeded().await;
    for ddl in [
        "CREATE TABLE region (country TEXT NOT NULL, code TEXT NOT NULL, name TEXT NOT NULL, \
         PRIMARY KEY (country, code))",
        "CREATE TABLE office (id INTEGER PRIMARY KEY AUTOINCREMENT, city TEXT NOT NULL, \
         region_country TEXT, region_code TEXT)",
    ] {
        dao.execute_update(ddl, &[]).await.unwrap();
    }
    for (country, code, name) in [("DE", "BY", "Bavaria"), ("DE", "BE", "Berlin"), ("AT", "BY", "Elsewhere")] {
        dao.save(Region {
            country: country.into(),
            code: code.into(),
            name: name.into(),
            ..Default::default()
        })
        .await
        .unwrap();
    }
    for (city, country, code) in [
        ("Nuremberg", "DE", "BY"),
        ("Munich", "DE", "BY"),
        ("Berlin", "DE", "BE"),
        ("Decoy", "AT", "BY"),
    ] {
        dao.save(Office {
            city: city.into(),
            region_country: country.into(),
            region_code: code.into(),
            ..Default::default()
        })
        .await
        .unwrap();
    }
    recorder.clear();

    let bavaria: Region = dao
        .find(&["DE".into(), "BY".into()])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bavaria.name, "Bavaria");
    assert!(bavaria.offices.is_loaded());
    let cities: Vec<&str> = bavaria.offices.items().iter().map(|o| o.city.as_str()).collect();
    assert_eq!(cities, ["Munich", "Nuremberg"]);
    assert_eq!(
        recorder.count_matching(
            "FROM office WHERE region_country = ? AND region_code = ? ORDER BY city ASC"
        ),
        1
    );

    let berlin: Option<Region> = dao.find(&["DE".into(), "BE".into()]).await.unwrap();
    assert_eq!(berlin.map(|r| r.offices.items().len()), Some(1));
}
