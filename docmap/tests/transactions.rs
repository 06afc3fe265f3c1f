use docmap::{memory::MemoryBackend, prelude::*};

fn notes() -> PropertySet {
    PropertySet::new([
        Property::named("id", PropertyType::String).identifier(),
        Property::named("text", PropertyType::String),
    ])
}

fn note(text: &str) -> PropertyBox {
    PropertyBox::builder(notes()).set("text", text).build().unwrap()
}

async fn stored(datastore: &Datastore<MemoryBackend>) -> u64 {
    datastore
        .operations()
        .count(&DataTarget::named("notes"), &notes(), &Query::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn auto_commit_transaction_publishes_its_writes() {
    let datastore = Datastore::new(MemoryBackend::new()).unwrap();
    let target = DataTarget::named("notes");
    let mut unit = datastore.unit_of_work();

    let inserted = unit
        .with_transaction(TransactionConfiguration::auto_commit(), async |scope| {
            assert!(!scope.is_joined());
            scope.operations().insert(&target, &note("first")).await?;
            scope.operations().insert(&target, &note("second")).await?;
            Ok(2)
        })
        .await
        .unwrap();

    assert_eq!(inserted, 2);
    assert_eq!(stored(&datastore).await, 2);
    assert!(!unit.in_transaction());
}

#[tokio::test]
async fn uncommitted_transaction_is_rolled_back_at_the_end() {
    let datastore = Datastore::new(MemoryBackend::new()).unwrap();
    let target = DataTarget::named("notes");
    let mut unit = datastore.unit_of_work();

    unit.with_transaction(TransactionConfiguration::default(), async |scope| {
        scope.operations().insert(&target, &note("draft")).await?;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(stored(&datastore).await, 0);
}

#[tokio::test]
async fn explicit_commit_inside_the_scope() {
    let datastore = Datastore::new(MemoryBackend::new()).unwrap();
    let target = DataTarget::named("notes");
    let mut unit = datastore.unit_of_work();

    let committed = unit
        .with_transaction(TransactionConfiguration::default(), async |scope| {
            scope.operations().insert(&target, &note("kept")).await?;
            scope.transaction().commit().await
        })
        .await
        .unwrap();

    assert!(committed);
    assert_eq!(stored(&datastore).await, 1);
}

#[tokio::test]
async fn failing_work_rolls_back_and_propagates_the_error() {
    let datastore = Datastore::new(MemoryBackend::new()).unwrap();
    let target = DataTarget::named("notes");
    let mut unit = datastore.unit_of_work();

    let result: DatastoreResult<()> = unit
        .with_transaction(TransactionConfiguration::auto_commit(), async |scope| {
            scope.operations().insert(&target, &note("lost")).await?;
            Err(DatastoreError::DataAccess("boom".to_string()))
        })
        .await;

    assert_eq!(result, Err(DatastoreError::DataAccess("boom".to_string())));
    assert_eq!(stored(&datastore).await, 0);
}

#[tokio::test]
async fn writes_are_invisible_outside_until_commit() {
    let datastore = Datastore::new(MemoryBackend::new()).unwrap();
    let target = DataTarget::named("notes");
    let mut unit = datastore.unit_of_work();

    unit.begin(TransactionConfiguration::default()).await.unwrap();
    assert!(unit.in_transaction());
    unit.operations().insert(&target, &note("pending")).await.unwrap();

    assert_eq!(stored(&datastore).await, 0);
    let inside = unit
        .operations()
        .count(&target, &notes(), &Query::new())
        .await
        .unwrap();
    assert_eq!(inside, 1);

    assert!(unit.commit().await.unwrap());
    assert_eq!(stored(&datastore).await, 1);
}

#[tokio::test]
async fn nested_flow_joins_and_marks_rollback_only() {
    let datastore = Datastore::new(MemoryBackend::new()).unwrap();
    let target = DataTarget::named("notes");
    let mut unit = datastore.unit_of_work();

    unit.begin(TransactionConfiguration::default()).await.unwrap();
    unit.operations().insert(&target, &note("outer")).await.unwrap();

    let joined: DatastoreResult<()> = unit
        .with_transaction(TransactionConfiguration::auto_commit(), async |scope| {
            assert!(scope.is_joined());
            scope.operations().insert(&target, &note("inner")).await?;
            Err(DatastoreError::DataAccess("inner failure".to_string()))
        })
        .await;
    assert!(joined.is_err());

    // the joined failure leaves the outer transaction active but rollback-only
    assert!(unit.in_transaction());
    assert!(unit.transaction().is_some_and(|transaction| transaction.is_rollback_only()));
    assert!(!unit.commit().await.unwrap());
    assert_eq!(stored(&datastore).await, 0);
}

#[tokio::test]
async fn commit_without_transaction_is_illegal() {
    let datastore = Datastore::new(MemoryBackend::new()).unwrap();
    let mut unit = datastore.unit_of_work();

    assert!(matches!(unit.commit().await, Err(DatastoreError::IllegalTransactionStatus(_))));
    assert!(matches!(unit.rollback().await, Err(DatastoreError::IllegalTransactionStatus(_))));
    unit.finish().await.unwrap();
}

#[tokio::test]
async fn begin_finalizes_a_dangling_transaction() {
    let datastore = Datastore::new(MemoryBackend::new()).unwrap();
    let target = DataTarget::named("notes");
    let mut unit = datastore.unit_of_work();

    unit.begin(TransactionConfiguration::default()).await.unwrap();
    unit.operations().insert(&target, &note("abandoned")).await.unwrap();

    unit.begin(TransactionConfiguration::auto_commit()).await.unwrap();
    unit.operations().insert(&target, &note("kept")).await.unwrap();
    unit.finish().await.unwrap();

    assert_eq!(stored(&datastore).await, 1);
}
