use chrono::{Duration, TimeZone, Utc};
use futures::StreamExt;
use rust_decimal::Decimal;
use uuid::Uuid;

use sturdy::{col, Error, Value};

#[path = "../fixtures/mod.rs"]
mod fixtures;

use fixtures::{library_db, older_than, people_db, AccountStatus, Author, Person};

fn john_doe() -> Person {
    let mut person = Person::new("John", "Doe", 30);
    person.email = Some("john.doe@example.com".to_owned());
    person.salary = Decimal::new(7_500_050, 2);
    person.department = "Engineering".to_owned();
    person
}

#[tokio::test]
async fn crud_round_trip() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    let mut person = john_doe();
    people.create(&mut person).await?;
    assert!(person.id > 0);

    let loaded = people
        .read_by_id(person.id)
        .await?
        .expect("created row must be readable");
    assert_eq!(loaded, person);
    assert_eq!(loaded.salary, Decimal::new(7_500_050, 2));

    let mut changed = loaded;
    changed.age = 31;
    changed.salary = Decimal::new(8_000_000, 2);
    people.update(&mut changed).await?;

    let reloaded = people.read_by_id(person.id).await?.expect("still present");
    assert_eq!(reloaded.age, 31);
    assert_eq!(reloaded.salary, Decimal::new(8_000_000, 2));

    people.delete(&reloaded).await?;
    assert!(people.read_by_id(person.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn batch_insert_and_filter() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    let mut rows: Vec<Person> = (0..100)
        .map(|i| Person::new(&format!("FirstName{i}"), "Batch", 20 + (i % 50)))
        .collect();

    let outcome = people.create_many(&mut rows).await;
    assert!(outcome.first_error.is_none(), "{:?}", outcome.first_error);
    assert_eq!(outcome.affected, 100);
    assert_eq!(people.count(None).await?, 100);

    let over_forty = people.read_many(older_than(40)).await?;
    assert_eq!(over_forty.len(), 58);
    assert!(over_forty.iter().all(|p| p.age > 40));

    Ok(())
}

#[tokio::test]
async fn optimistic_concurrency_loser_fails() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = library_db().await?;
    let authors = db.repository::<Author>()?;

    let mut author = Author::new("Test");
    authors.create(&mut author).await?;
    assert_eq!(author.version, 1);

    let mut copy_a = authors.read_by_id(author.id).await?.expect("row exists");
    let mut copy_b = authors.read_by_id(author.id).await?.expect("row exists");

    copy_a.name = "First Writer".to_owned();
    authors.update(&mut copy_a).await?;
    assert_eq!(copy_a.version, 2);

    copy_b.name = "Second Writer".to_owned();
    match authors.update(&mut copy_b).await {
        Err(Error::OptimisticConcurrency) => {}
        other => panic!("expected OptimisticConcurrency, got {other:?}"),
    }

    // the loser changed nothing beyond A's update
    let current = authors.read_by_id(author.id).await?.expect("row exists");
    assert_eq!(current.name, "First Writer");
    assert_eq!(current.version, 2);

    Ok(())
}

#[tokio::test]
async fn update_without_version_reports_not_found() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    let mut person = john_doe();
    people.create(&mut person).await?;
    people.delete_by_id(person.id).await?;

    match people.update(&mut person).await {
        Err(Error::NotFound) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }

    match people.delete_by_id(person.id).await {
        Err(Error::NotFound) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn membership_predicates_match_translator_contract() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    for (name, department) in [("a", "IT"), ("b", "HR"), ("c", "Finance"), ("d", "Legal")] {
        let mut person = Person::new(name, "Member", 30);
        person.department = department.to_owned();
        people.create(&mut person).await?;
    }

    let departments = ["IT", "HR", "Finance"];
    let matched = people
        .read_many(col("Department").is_in(departments))
        .await?;
    assert_eq!(matched.len(), 3);

    let between = people
        .read_many(col("Age").between(25, 65))
        .await?;
    assert_eq!(between.len(), 4);

    // the empty set matches nothing
    let none = people
        .read_many(col("Department").is_in(Vec::<String>::new()))
        .await?;
    assert!(none.is_empty());

    Ok(())
}

#[tokio::test]
async fn upsert_is_idempotent() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    let mut person = john_doe();
    people.create(&mut person).await?;

    person.age = 33;
    people.upsert(&mut person).await?;
    people.upsert(&mut person).await?;

    assert_eq!(people.count(None).await?, 1);
    let loaded = people.read_by_id(person.id).await?.expect("one row");
    assert_eq!(loaded.age, 33);
    assert_eq!(loaded, person);

    // absent key goes down the insert path
    let mut fresh = Person::new("New", "Hire", 22);
    people.upsert(&mut fresh).await?;
    assert!(fresh.id > 0);
    assert_eq!(people.count(None).await?, 2);

    Ok(())
}

#[tokio::test]
async fn typed_columns_round_trip() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    let mut person = john_doe();
    person.status = AccountStatus::Suspended;
    person.badge = Uuid::new_v4();
    person.hired_at = Utc.with_ymd_and_hms(2021, 6, 15, 8, 30, 17).unwrap();
    person.tenure = Duration::days(730) + Duration::seconds(42);
    people.create(&mut person).await?;

    let loaded = people.read_by_id(person.id).await?.expect("row exists");
    assert_eq!(loaded.status, AccountStatus::Suspended);
    assert_eq!(loaded.badge, person.badge);
    assert_eq!(loaded.hired_at, person.hired_at);
    assert_eq!(loaded.tenure, person.tenure);
    assert_eq!(loaded.email.as_deref(), Some("john.doe@example.com"));

    Ok(())
}

#[tokio::test]
async fn unknown_enum_name_is_a_type_mismatch() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    let mut person = john_doe();
    people.create(&mut person).await?;
    people
        .execute_sql(
            "UPDATE people SET Status = ? WHERE Id = ?",
            vec![Value::Text("Zombie".into()), Value::Int(person.id)],
        )
        .await?;

    match people.read_by_id(person.id).await {
        Err(Error::TypeMismatch(message)) => assert!(message.contains("Zombie")),
        other => panic!("expected TypeMismatch, got {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn aggregates_over_predicates() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    for age in [20, 30, 40, 50] {
        let mut person = Person::new("Agg", "Case", age);
        people.create(&mut person).await?;
    }

    assert_eq!(people.count(Some(older_than(25))).await?, 3);
    assert_eq!(people.sum::<i64>("Age", None).await?, Some(140));
    assert_eq!(people.avg::<f64>("Age", None).await?, Some(35.0));
    assert_eq!(people.min::<i64>("Age", None).await?, Some(20));
    assert_eq!(people.max::<i64>("Age", None).await?, Some(50));
    assert!(people.exists(older_than(45)).await?);
    assert!(!people.exists(older_than(55)).await?);

    // aggregates over an empty relation are NULL, not zero
    people.delete_all().await?;
    assert_eq!(people.sum::<i64>("Age", None).await?, None);
    assert_eq!(people.count(None).await?, 0);

    Ok(())
}

#[tokio::test]
async fn field_and_batch_updates() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    for (name, age) in [("a", 25), ("b", 45), ("c", 52)] {
        let mut person = Person::new(name, "Update", age);
        person.salary = Decimal::new(100_000, 2);
        people.create(&mut person).await?;
    }

    let touched = people
        .update_field(older_than(40), "Department", "Veterans")
        .await?;
    assert_eq!(touched, 2);

    let raised = people
        .batch_update(
            col("Department").eq("Veterans"),
            vec![("Age".to_owned(), col("Age").add(1))],
        )
        .await?;
    assert_eq!(raised, 2);

    let veterans = people.read_many(col("Department").eq("Veterans")).await?;
    let mut ages: Vec<i32> = veterans.iter().map(|p| p.age).collect();
    ages.sort_unstable();
    assert_eq!(ages, [46, 53]);

    let removed = people.batch_delete(older_than(45)).await?;
    assert_eq!(removed, 2);
    assert_eq!(people.count(None).await?, 1);

    Ok(())
}

#[tokio::test]
async fn query_builder_pages_and_projects() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    for i in 0..10 {
        let mut person = Person::new(&format!("P{i:02}"), "Page", 20 + i);
        people.create(&mut person).await?;
    }

    let page = people
        .query()
        .filter(col("LastName").eq("Page"))
        .order_by_desc(col("Age"))
        .then_by(col("FirstName"))
        .skip(2)
        .take(3)
        .fetch_all()
        .await?;
    let ages: Vec<i32> = page.iter().map(|p| p.age).collect();
    assert_eq!(ages, [27, 26, 25]);

    let rows = people
        .query()
        .select(["FirstName", "Age"])
        .filter(col("Age").ge(28))
        .order_by(col("Age"))
        .fetch_rows()
        .await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].columns(), ["FirstName", "Age"]);
    assert_eq!(rows[0].try_get::<String>("FirstName")?, "P08");

    let distinct = people
        .query()
        .select(["LastName"])
        .distinct()
        .fetch_rows()
        .await?;
    assert_eq!(distinct.len(), 1);

    Ok(())
}

#[tokio::test]
async fn string_predicates() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    for name in ["Annabel", "Anna", "Joanna", "Bert"] {
        let mut person = Person::new(name, "Str", 30);
        people.create(&mut person).await?;
    }

    assert_eq!(
        people
            .read_many(col("FirstName").starts_with("Anna"))
            .await?
            .len(),
        2
    );
    assert_eq!(
        people
            .read_many(col("FirstName").contains("anna"))
            .await?
            .len(),
        3
    );
    assert_eq!(
        people
            .read_many(col("FirstName").ends_with("anna"))
            .await?
            .len(),
        2
    );
    assert_eq!(
        people
            .read_many(col("FirstName").length().eq(4))
            .await?
            .len(),
        2
    );
    assert_eq!(
        people
            .read_many(col("FirstName").upper().eq("BERT"))
            .await?
            .len(),
        1
    );
    assert_eq!(
        people
            .read_many(col("Email").is_null())
            .await?
            .len(),
        4
    );

    Ok(())
}

#[tokio::test]
async fn raw_sql_surfaces() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    for age in [21, 35, 60] {
        let mut person = Person::new("Raw", "Sql", age);
        people.create(&mut person).await?;
    }

    let stream = people
        .from_sql(
            "SELECT * FROM people WHERE Age > ? ORDER BY Age",
            vec![Value::Int(30)],
        )
        .await?;
    let fetched: Vec<Person> = stream
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<sturdy::Result<_>>()?;
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0].age, 35);

    match people.from_sql("DELETE FROM people", vec![]).await {
        Err(Error::InvalidState(_)) => {}
        other => panic!("expected InvalidState, got {:?}", other.is_ok()),
    }

    let affected = people
        .execute_sql("UPDATE people SET Age = Age + 1 WHERE Age < ?", vec![Value::Int(30)])
        .await?;
    assert_eq!(affected, 1);

    let raw_filtered = people
        .query()
        .filter_raw("Age % 2 = ?", vec![Value::Int(0)])
        .fetch_all()
        .await?;
    assert_eq!(raw_filtered.len(), 2);

    Ok(())
}

#[tokio::test]
async fn captured_sql_is_observational() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    assert!(!people.capture_sql());
    assert_eq!(people.last_executed_sql(), None);

    people.set_capture_sql(true);
    people.count(None).await?;
    let captured = people.last_executed_sql().expect("capture is on");
    assert!(captured.contains("COUNT(*)"));

    // switching capture off clears the last statement immediately
    people.set_capture_sql(false);
    assert_eq!(people.last_executed_sql(), None);

    let before = people.statements_executed();
    people.count(None).await?;
    assert_eq!(people.statements_executed(), before + 1);

    Ok(())
}

#[tokio::test]
async fn transactions_commit_rollback_and_drop() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    // commit
    let mut tx = db.begin_transaction().await?;
    let mut person = john_doe();
    people.create_in(&mut tx, &mut person).await?;
    people
        .update_field_in(&mut tx, col("Id").eq(person.id), "Department", "Committed")
        .await?;
    tx.commit().await?;
    assert_eq!(
        people.read_by_id(person.id).await?.expect("committed").department,
        "Committed"
    );

    // rollback
    let mut tx = db.begin_transaction().await?;
    let mut discarded = Person::new("Rolled", "Back", 1);
    people.create_in(&mut tx, &mut discarded).await?;
    tx.rollback().await?;
    assert_eq!(people.count(None).await?, 1);

    // drop of an active handle rolls back
    {
        let mut tx = db.begin_transaction().await?;
        let mut dropped = Person::new("Dropped", "Tx", 2);
        people.create_in(&mut tx, &mut dropped).await?;
    }
    // the queued rollback races this read only on the worker channel; give it a beat
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(people.count(None).await?, 1);

    // nested transactions are a programming error
    let mut tx = db.begin_transaction().await?;
    match tx.begin() {
        Err(Error::InvalidState(_)) => {}
        other => panic!("expected InvalidState, got {:?}", other.is_ok()),
    }
    tx.rollback().await?;

    Ok(())
}

#[tokio::test]
async fn dropping_an_active_transaction_rolls_back() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    let mut person = john_doe();
    {
        let mut tx = db.begin_transaction().await?;
        people.create_in(&mut tx, &mut person).await?;
        assert!(person.id > 0);
        assert!(tx.is_open());
        // neither commit nor rollback: the handle leaves scope while active
    }

    // the rollback is queued on the connection's worker; give it a beat
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(people.count(None).await?, 0);
    assert!(people.read_by_id(person.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn failed_statement_leaves_transaction_usable_for_rollback() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = people_db().await?;
    let people = db.repository::<Person>()?;

    let mut person = john_doe();
    people.create(&mut person).await?;

    let mut tx = db.begin_transaction().await?;
    people
        .update_field_in(&mut tx, col("Id").eq(person.id), "Department", "Doomed")
        .await?;

    let failure = people
        .execute_sql_in(&mut tx, "UPDATE nowhere SET x = 1", vec![])
        .await;
    assert!(failure.is_err());

    // the earlier statement must not survive the rollback
    tx.rollback().await?;
    assert_eq!(
        people.read_by_id(person.id).await?.expect("row").department,
        "Engineering"
    );

    Ok(())
}

#[tokio::test]
async fn constraint_errors_carry_their_kind() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = library_db().await?;
    let books = db.repository::<fixtures::Book>()?;
    let tags = db.repository::<fixtures::Tag>()?;

    let mut orphan = fixtures::Book::new("No Author", 9_999);
    match books.create(&mut orphan).await {
        Err(Error::ForeignKeyViolation(_)) => {}
        other => panic!("expected ForeignKeyViolation, got {:?}", other.is_ok()),
    }

    let mut tag = fixtures::Tag::new("fiction");
    tags.create(&mut tag).await?;
    let mut duplicate = fixtures::Tag::new("fiction");
    match tags.create(&mut duplicate).await {
        Err(Error::UniqueViolation(e)) => {
            assert_eq!(e.constraint(), Some("tags.Name"));
        }
        other => panic!("expected UniqueViolation, got {:?}", other.is_ok()),
    }

    Ok(())
}

#[tokio::test]
async fn create_many_inside_transaction_is_atomic() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = library_db().await?;
    let tags = db.repository::<fixtures::Tag>()?;

    // second chunk element collides with the first; everything rolls back
    let mut tx = db.begin_transaction().await?;
    let mut rows = vec![fixtures::Tag::new("sci-fi"), fixtures::Tag::new("sci-fi")];
    let result = tags.create_many_in(&mut tx, &mut rows).await;
    assert!(result.is_err());
    tx.rollback().await?;

    assert_eq!(tags.count(None).await?, 0);

    Ok(())
}
