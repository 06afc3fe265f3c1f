use std::pin::pin;

use docmap::{memory::MemoryBackend, prelude::*};
use futures::{StreamExt, TryStreamExt};
use rstest::rstest;

fn items() -> PropertySet {
    PropertySet::new([
        Property::named("id", PropertyType::ObjectId).identifier(),
        Property::named("code", PropertyType::String),
        Property::named("stock", PropertyType::Integer),
    ])
}

fn item(code: &str, stock: i32) -> PropertyBox {
    PropertyBox::builder(items())
        .set("code", code)
        .set("stock", stock)
        .build()
        .unwrap()
}

// BlockingDatastore owns a runtime, so these tests cannot run under tokio::test.

#[test]
fn blocking_operations_run_to_completion() {
    let datastore = Datastore::builder(MemoryBackend::new()).build_blocking().unwrap();
    let target = DataTarget::named("items");

    let inserted = datastore
        .operations()
        .bulk_insert(&target, &[item("a", 3), item("b", 0), item("c", 7)])
        .unwrap();
    assert_eq!(inserted.affected_count, 3);

    let in_stock = datastore
        .operations()
        .query(
            &target,
            &items(),
            &Query::builder()
                .filter(Filter::gt("stock", 0))
                .sort("code", SortDirection::Asc)
                .build(),
        )
        .unwrap();
    let codes: Vec<_> = in_stock.iter().filter_map(|value| value.get("code").cloned()).collect();
    assert_eq!(codes, vec![Value::from("a"), Value::from("c")]);
}

#[rstest]
#[case::auto_commit(TransactionConfiguration::auto_commit(), 1)]
#[case::rolled_back_at_the_end(TransactionConfiguration::default(), 0)]
fn blocking_transaction_follows_its_configuration(#[case] configuration: TransactionConfiguration, #[case] expected: u64) {
    let datastore = Datastore::builder(MemoryBackend::new()).build_blocking().unwrap();
    let target = DataTarget::named("items");

    datastore
        .with_transaction(configuration, |transaction| {
            transaction.operations().insert(&target, &item("a", 1))
        })
        .unwrap();

    let count = datastore.operations().count(&target, &items(), &Query::new()).unwrap();
    assert_eq!(count, expected);
}

#[test]
fn blocking_transaction_rolls_back_on_error() {
    let datastore = Datastore::builder(MemoryBackend::new()).build_blocking().unwrap();
    let target = DataTarget::named("items");

    let result: DatastoreResult<()> = datastore.with_transaction(TransactionConfiguration::auto_commit(), |transaction| {
        transaction.operations().insert(&target, &item("a", 1))?;
        Err(DatastoreError::DataAccess("stop".to_string()))
    });

    assert!(matches!(result, Err(DatastoreError::DataAccess(_))));
    assert_eq!(datastore.operations().count(&target, &items(), &Query::new()).unwrap(), 0);
}

#[test]
fn blocking_rollback_only_transaction_does_not_commit() {
    let datastore = Datastore::builder(MemoryBackend::new()).build_blocking().unwrap();
    let target = DataTarget::named("items");

    let mut transaction = datastore.begin(TransactionConfiguration::default()).unwrap();
    transaction.operations().insert(&target, &item("a", 1)).unwrap();
    transaction.set_rollback_only();

    assert!(!transaction.commit().unwrap());
    assert!(!transaction.is_active());
    assert_eq!(datastore.operations().count(&target, &items(), &Query::new()).unwrap(), 0);
}

#[tokio::test]
async fn stream_query_yields_decoded_values() {
    let datastore = Datastore::builder(MemoryBackend::new()).build_stream().unwrap();
    let target = DataTarget::named("items");

    for value in [item("a", 3), item("b", 0), item("c", 7)] {
        let result = datastore.insert(target.clone(), value).try_collect::<Vec<_>>().await.unwrap();
        assert_eq!(result.len(), 1);
    }

    let query = Query::builder().sort("stock", SortDirection::Desc).build();
    let values: Vec<PropertyBox> = datastore.query(target.clone(), items(), query).try_collect().await.unwrap();
    let stocks: Vec<_> = values.iter().filter_map(|value| value.get("stock").cloned()).collect();
    assert_eq!(stocks, vec![Value::Integer(7), Value::Integer(3), Value::Integer(0)]);

    let mut counted = pin!(datastore.count(target, items(), Query::new()));
    assert_eq!(counted.next().await, Some(Ok(3)));
    assert_eq!(counted.next().await, None);
}

#[tokio::test]
async fn stream_is_lazy_until_polled() {
    let datastore = Datastore::builder(MemoryBackend::new()).build_stream().unwrap();
    let target = DataTarget::named("items");

    let pending = datastore.insert(target.clone(), item("a", 1));
    let before = datastore.count(target.clone(), items(), Query::new()).try_collect::<Vec<_>>().await.unwrap();
    assert_eq!(before, vec![0]);

    drop(pending);
    let after = datastore.count(target, items(), Query::new()).try_collect::<Vec<_>>().await.unwrap();
    assert_eq!(after, vec![0]);
}

#[tokio::test]
async fn stream_distinct_and_errors() {
    let datastore = Datastore::builder(MemoryBackend::new()).build_stream().unwrap();
    let target = DataTarget::named("items");
    for value in [item("a", 3), item("b", 3), item("c", 7)] {
        datastore.insert(target.clone(), value).try_collect::<Vec<_>>().await.unwrap();
    }

    let stock = items().get("stock").cloned().unwrap();
    let distinct: Vec<Value> = datastore
        .distinct(target.clone(), items(), stock, None)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(distinct, vec![Value::Integer(3), Value::Integer(7)]);

    let missing_id = datastore.update(target, item("a", 0)).try_collect::<Vec<_>>().await;
    assert!(matches!(missing_id, Err(DatastoreError::InvalidDocumentIdentifier(_))));
}

#[tokio::test]
async fn stream_bulk_operations_and_lookups() {
    let datastore = Datastore::builder(MemoryBackend::new()).build_stream().unwrap();
    let target = DataTarget::named("items");

    let inserted: Vec<OperationResult> = datastore
        .bulk_insert(target.clone(), vec![item("a", 3), item("b", 0), item("c", 7)])
        .try_collect()
        .await
        .unwrap();
    assert_eq!(inserted[0].affected_count, 3);

    let restocked: Vec<OperationResult> = datastore
        .bulk_update(
            target.clone(),
            items(),
            Some(Filter::eq("stock", 0)),
            Update::new().set("stock", 5),
        )
        .try_collect()
        .await
        .unwrap();
    assert_eq!(restocked[0].affected_count, 1);

    let b: Vec<PropertyBox> = datastore
        .query_one(target.clone(), items(), Query::builder().filter(Filter::eq("code", "b")).build())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(b.len(), 1);
    assert_eq!(b[0].get("stock"), Some(&Value::Integer(5)));

    let id = b[0].get("id").cloned().unwrap();
    let found: Vec<PropertyBox> = datastore.find_by_id(target.clone(), items(), id).try_collect().await.unwrap();
    assert_eq!(found, b);

    let nothing: Vec<PropertyBox> = datastore
        .query_one(target.clone(), items(), Query::builder().filter(Filter::eq("code", "z")).build())
        .try_collect()
        .await
        .unwrap();
    assert!(nothing.is_empty());

    let deleted: Vec<OperationResult> = datastore
        .bulk_delete(target.clone(), items(), Some(Filter::gt("stock", 4)))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(deleted[0].affected_count, 2);

    let remaining = datastore.count(target, items(), Query::new()).try_collect::<Vec<_>>().await.unwrap();
    assert_eq!(remaining, vec![1]);
}

#[tokio::test]
async fn stream_aggregate_decodes_against_the_set() {
    let datastore = Datastore::builder(MemoryBackend::new()).build_stream().unwrap();
    let target = DataTarget::named("items");
    datastore
        .bulk_insert(target.clone(), vec![item("a", 3), item("b", 0), item("c", 7)])
        .try_collect::<Vec<_>>()
        .await
        .unwrap();

    let aggregation = Aggregation::new()
        .filter(Filter::gt("stock", 0))
        .sort(QuerySort(vec![Sort::desc("stock")]));
    let values: Vec<PropertyBox> = datastore.aggregate(target, items(), aggregation).try_collect().await.unwrap();
    let codes: Vec<_> = values.iter().filter_map(|value| value.get("code").cloned()).collect();
    assert_eq!(codes, vec![Value::from("c"), Value::from("a")]);
}

#[tokio::test]
async fn stream_transaction_publishes_on_commit() {
    let datastore = Datastore::builder(MemoryBackend::new()).build_stream().unwrap();
    let target = DataTarget::named("items");

    let bound = datastore
        .begin(TransactionConfiguration::default())
        .try_collect::<Vec<_>>()
        .await
        .unwrap()
        .remove(0);
    assert!(bound.is_bound());
    bound
        .bulk_insert(target.clone(), vec![item("a", 1), item("b", 2)])
        .try_collect::<Vec<_>>()
        .await
        .unwrap();

    let outside = datastore.count(target.clone(), items(), Query::new()).try_collect::<Vec<_>>().await.unwrap();
    let inside = bound.count(target.clone(), items(), Query::new()).try_collect::<Vec<_>>().await.unwrap();
    assert_eq!((outside, inside), (vec![0], vec![2]));

    let committed = bound.commit().try_collect::<Vec<_>>().await.unwrap();
    assert_eq!(committed, vec![true]);
    let after = datastore.count(target.clone(), items(), Query::new()).try_collect::<Vec<_>>().await.unwrap();
    assert_eq!(after, vec![2]);

    // the transaction has ended, so the bound datastore refuses further work
    let late = bound.insert(target, item("c", 3)).try_collect::<Vec<_>>().await;
    assert!(matches!(late, Err(DatastoreError::IllegalTransactionStatus(_))));
    let again = bound.commit().try_collect::<Vec<_>>().await;
    assert!(matches!(again, Err(DatastoreError::IllegalTransactionStatus(_))));
}

#[tokio::test]
async fn stream_transaction_rolls_back() {
    let datastore = Datastore::builder(MemoryBackend::new()).build_stream().unwrap();
    let target = DataTarget::named("items");

    let bound = datastore
        .begin(TransactionConfiguration::auto_commit())
        .try_collect::<Vec<_>>()
        .await
        .unwrap()
        .remove(0);
    bound.insert(target.clone(), item("a", 1)).try_collect::<Vec<_>>().await.unwrap();
    bound.rollback().try_collect::<Vec<_>>().await.unwrap();

    let count = datastore.count(target, items(), Query::new()).try_collect::<Vec<_>>().await.unwrap();
    assert_eq!(count, vec![0]);
    assert!(matches!(
        datastore.commit().try_collect::<Vec<_>>().await,
        Err(DatastoreError::IllegalTransactionStatus(_))
    ));
}

#[tokio::test]
async fn stream_with_transaction_joins_a_bound_transaction() {
    let datastore = Datastore::builder(MemoryBackend::new()).build_stream().unwrap();
    let target = DataTarget::named("items");

    let own: Vec<u32> = datastore
        .with_transaction(TransactionConfiguration::auto_commit(), async |scope| {
            assert!(!scope.is_joined());
            scope.operations().insert(&DataTarget::named("items"), &item("a", 1)).await?;
            Ok(1)
        })
        .try_collect()
        .await
        .unwrap();
    assert_eq!(own, vec![1]);

    let bound = datastore
        .begin(TransactionConfiguration::default())
        .try_collect::<Vec<_>>()
        .await
        .unwrap()
        .remove(0);
    let joined: DatastoreResult<Vec<()>> = bound
        .with_transaction::<(), _>(TransactionConfiguration::auto_commit(), async |scope| {
            assert!(scope.is_joined());
            scope.operations().insert(&DataTarget::named("items"), &item("b", 2)).await?;
            Err(DatastoreError::DataAccess("inner failure".to_string()))
        })
        .try_collect()
        .await;
    assert!(joined.is_err());

    // the joined failure made the bound transaction rollback-only
    assert_eq!(bound.commit().try_collect::<Vec<_>>().await.unwrap(), vec![false]);
    let count = datastore.count(target, items(), Query::new()).try_collect::<Vec<_>>().await.unwrap();
    assert_eq!(count, vec![1]);
}
