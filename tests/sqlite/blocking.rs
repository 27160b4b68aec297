//! The blocking façade, driven without any ambient async runtime.

use rust_decimal::Decimal;

use sturdy::blocking::Database;
use sturdy::{col, Error, IntoValue};

#[path = "../fixtures/mod.rs"]
mod fixtures;

use fixtures::Person;

#[test]
fn blocking_crud_round_trip() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = Database::connect("sqlite::memory:")?;
    let people = db.repository::<Person>()?;
    people.initialize_table()?;

    let mut person = Person::new("Sync", "Caller", 41);
    person.salary = Decimal::new(1_000_00, 2);
    people.create(&mut person)?;
    assert!(person.id > 0);

    let loaded = people.read_by_id(person.id)?.expect("row exists");
    assert_eq!(loaded, person);

    assert_eq!(people.count(Some(col("Age").gt(40)))?, 1);
    assert_eq!(people.update_field(col("Id").eq(person.id), "Age", 42)?, 1);

    people.delete_by_id(person.id)?;
    match people.delete_by_id(person.id) {
        Err(Error::NotFound) => {}
        other => panic!("expected NotFound, got {:?}", other.is_ok()),
    }

    Ok(())
}

#[test]
fn blocking_transactions_share_semantics_with_async() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = Database::connect("sqlite::memory:")?;
    let people = db.repository::<Person>()?;
    people.initialize_table()?;

    let mut tx = db.begin_transaction()?;
    let mut person = Person::new("Tx", "Sync", 30);
    people.create_in(&mut tx, &mut person)?;
    tx.commit()?;
    assert_eq!(people.count(None)?, 1);

    let mut tx = db.begin_transaction()?;
    let mut discarded = Person::new("Gone", "Soon", 30);
    people.create_in(&mut tx, &mut discarded)?;
    tx.rollback()?;
    assert_eq!(people.count(None)?, 1);

    Ok(())
}

#[test]
fn blocking_batches_and_raw_sql() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let db = Database::connect("sqlite::memory:")?;
    let people = db.repository::<Person>()?;
    people.initialize_table()?;

    let mut rows: Vec<Person> = (0..25)
        .map(|i| Person::new(&format!("B{i}"), "Bulk", 20 + i))
        .collect();
    let outcome = people.create_many(&mut rows);
    assert!(outcome.first_error.is_none());
    assert_eq!(outcome.affected, 25);

    let fetched = people.from_sql("SELECT * FROM people WHERE Age >= ?", vec![40.into_value()])?;
    assert_eq!(fetched.len(), 5);

    assert_eq!(people.batch_delete(col("Age").lt(30))?, 10);
    assert_eq!(people.count(None)?, 15);

    Ok(())
}
