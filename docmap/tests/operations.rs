use docmap::{
    bson::{Bson, doc, oid::ObjectId},
    memory::MemoryBackend,
    prelude::*,
};

fn people() -> PropertySet {
    PropertySet::new([
        Property::named("id", PropertyType::ObjectId).identifier(),
        Property::named("name", PropertyType::String),
        Property::named("age", PropertyType::Integer),
        Property::named("tags", PropertyType::array_of(PropertyType::String)),
        Property::named("address.city", PropertyType::String),
    ])
}

fn person(name: &str, age: i32, city: &str, tags: &[&str]) -> PropertyBox {
    PropertyBox::builder(people())
        .set("name", name)
        .set("age", age)
        .set("address.city", city)
        .set(
            "tags",
            Value::Array(tags.iter().map(|tag| Value::from(*tag)).collect()),
        )
        .build()
        .unwrap()
}

async fn seeded() -> (Datastore<MemoryBackend>, DataTarget) {
    let datastore = Datastore::new(MemoryBackend::new()).unwrap();
    let target = DataTarget::named("people");

    datastore
        .operations()
        .bulk_insert(
            &target,
            &[
                person("Ada", 36, "London", &["math", "code"]),
                person("Alan", 41, "London", &["code"]),
                person("Grace", 30, "New York", &["navy"]),
            ],
        )
        .await
        .unwrap();

    (datastore, target)
}

fn names(values: &[PropertyBox]) -> Vec<&str> {
    values
        .iter()
        .map(|value| match value.get("name") {
            Some(Value::String(name)) => name.as_str(),
            other => panic!("unexpected name {other:?}"),
        })
        .collect()
}

#[test]
fn basic_encode_places_identifier_in_id_field() {
    let set = PropertySet::new([
        Property::named("id", PropertyType::ObjectId).identifier(),
        Property::named("str", PropertyType::String),
        Property::named("bool", PropertyType::Boolean),
    ]);
    let datastore = Datastore::new(MemoryBackend::new()).unwrap();

    let without_id = PropertyBox::builder(set.clone())
        .set("str", "test")
        .set("bool", true)
        .build()
        .unwrap();
    assert_eq!(datastore.encode(&without_id).unwrap(), doc! { "str": "test", "bool": true });

    let id = ObjectId::new();
    let with_id = without_id.with_value("id", id).unwrap();
    let encoded = datastore.encode(&with_id).unwrap();
    assert_eq!(encoded.get("_id"), Some(&Bson::ObjectId(id)));
    assert_eq!(datastore.decode(&encoded, &set).unwrap(), with_id);
}

#[tokio::test]
async fn insert_reports_generated_key() {
    let datastore = Datastore::new(MemoryBackend::new()).unwrap();
    let target = DataTarget::named("people");

    let result = datastore
        .operations()
        .insert(&target, &person("Ada", 36, "London", &[]))
        .await
        .unwrap();

    assert_eq!(result.operation_type, OperationType::Insert);
    assert_eq!(result.affected_count, 1);
    let key = result.inserted_key(&Path::new("id")).cloned().unwrap();

    let found = datastore
        .operations()
        .find_by_id(&target, &people(), key.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.get("id"), Some(&key));
    assert_eq!(found.get("address.city"), Some(&Value::from("London")));
}

#[tokio::test]
async fn update_save_and_delete_by_identifier() {
    let datastore = Datastore::new(MemoryBackend::new()).unwrap();
    let target = DataTarget::named("people");

    let saved = datastore
        .operations()
        .save(&target, &person("Ada", 36, "London", &[]))
        .await
        .unwrap();
    assert_eq!(saved.operation_type, OperationType::Insert);
    let key = saved.first_inserted_key().cloned().unwrap();

    let stored = datastore
        .operations()
        .find_by_id(&target, &people(), key.clone())
        .await
        .unwrap()
        .unwrap();

    let older = stored.with_value("age", 37).unwrap();
    let updated = datastore.operations().update(&target, &older).await.unwrap();
    assert_eq!((updated.operation_type, updated.affected_count), (OperationType::Update, 1));

    let resaved = datastore
        .operations()
        .save(&target, &older.with_value("name", "Ada Lovelace").unwrap())
        .await
        .unwrap();
    assert_eq!(resaved.operation_type, OperationType::Update);

    let reloaded = datastore
        .operations()
        .find_by_id(&target, &people(), key.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.get("age"), Some(&Value::Integer(37)));
    assert_eq!(reloaded.get("name"), Some(&Value::from("Ada Lovelace")));

    let deleted = datastore.operations().delete(&target, &reloaded).await.unwrap();
    assert_eq!((deleted.operation_type, deleted.affected_count), (OperationType::Delete, 1));
    assert!(
        datastore
            .operations()
            .find_by_id(&target, &people(), key)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn update_without_identifier_value_fails() {
    let datastore = Datastore::new(MemoryBackend::new()).unwrap();
    let err = datastore
        .operations()
        .update(&DataTarget::named("people"), &person("Ada", 36, "London", &[]))
        .await
        .unwrap_err();

    assert!(matches!(err, DatastoreError::InvalidDocumentIdentifier(_)));
}

#[tokio::test]
async fn query_filters_sorts_and_pages() {
    let (datastore, target) = seeded().await;

    let query = Query::builder()
        .filter(Filter::eq("address.city", "London").or(Filter::lt("age", 31)))
        .sort("age", SortDirection::Desc)
        .offset(1)
        .limit(2)
        .build();
    let found = datastore.operations().query(&target, &people(), &query).await.unwrap();
    assert_eq!(names(&found), vec!["Ada", "Grace"]);

    let count = datastore
        .operations()
        .count(&target, &people(), &Query::builder().filter(Filter::gte("age", 36)).build())
        .await
        .unwrap();
    assert_eq!(count, 2);

    let tagged = datastore
        .operations()
        .query(&target, &people(), &Query::builder().filter(Filter::contains("tags", "code")).build())
        .await
        .unwrap();
    assert_eq!(tagged.len(), 2);
}

#[tokio::test]
async fn query_one_rejects_several_matches() {
    let (datastore, target) = seeded().await;

    let grace = datastore
        .operations()
        .query_one(&target, &people(), &Query::builder().filter(Filter::eq("name", "Grace")).build())
        .await
        .unwrap();
    assert_eq!(grace.and_then(|value| value.get("age").cloned()), Some(Value::Integer(30)));

    let err = datastore
        .operations()
        .query_one(&target, &people(), &Query::builder().filter(Filter::eq("address.city", "London")).build())
        .await
        .unwrap_err();
    assert!(matches!(err, DatastoreError::DataAccess(_)));
}

#[tokio::test]
async fn bulk_update_and_delete_by_filter() {
    let (datastore, target) = seeded().await;

    let updated = datastore
        .operations()
        .bulk_update(
            &target,
            &people(),
            Some(&Filter::eq("address.city", "London")),
            &Update::new().increment("age", 1).push("tags", "speaker"),
        )
        .await
        .unwrap();
    assert_eq!(updated.affected_count, 2);

    let speakers = datastore
        .operations()
        .count(&target, &people(), &Query::builder().filter(Filter::contains("tags", "speaker")).build())
        .await
        .unwrap();
    assert_eq!(speakers, 2);

    let deleted = datastore
        .operations()
        .bulk_delete(&target, &people(), Some(&Filter::gt("age", 40)))
        .await
        .unwrap();
    assert_eq!(deleted.affected_count, 1);

    let remaining = datastore.operations().count(&target, &people(), &Query::new()).await.unwrap();
    assert_eq!(remaining, 2);
}

#[tokio::test]
async fn bulk_insert_requires_one_property_set() {
    let datastore = Datastore::new(MemoryBackend::new()).unwrap();
    let other = PropertyBox::builder(PropertySet::new([Property::named("name", PropertyType::String)]))
        .set("name", "x")
        .build()
        .unwrap();

    let err = datastore
        .operations()
        .bulk_insert(&DataTarget::named("people"), &[person("Ada", 36, "London", &[]), other])
        .await
        .unwrap_err();
    assert!(matches!(err, DatastoreError::InvalidExpression(_)));
}

#[tokio::test]
async fn distinct_decodes_array_elements() {
    let (datastore, target) = seeded().await;
    let tags = people().get("tags").cloned().unwrap();

    let values = datastore
        .operations()
        .distinct(&target, &people(), &tags, None)
        .await
        .unwrap();
    assert_eq!(
        values,
        vec![Value::from("math"), Value::from("code"), Value::from("navy")]
    );

    let cities = datastore
        .operations()
        .distinct(
            &target,
            &people(),
            people().get("address.city").unwrap(),
            Some(&Filter::lt("age", 40)),
        )
        .await
        .unwrap();
    assert_eq!(cities, vec![Value::from("London"), Value::from("New York")]);
}

#[tokio::test]
async fn aggregation_pipelines_run_in_order() {
    let (datastore, target) = seeded().await;

    let oldest_londoner = datastore
        .operations()
        .aggregate(
            &target,
            &people(),
            &Aggregation::new()
                .filter(Filter::eq("address.city", "London"))
                .sort(QuerySort(vec![Sort::desc("age")]))
                .limit(1),
        )
        .await
        .unwrap();
    assert_eq!(names(&oldest_londoner), vec!["Alan"]);

    let counted = datastore
        .operations()
        .aggregate_documents(&target, &people(), &Aggregation::new().filter(Filter::gte("age", 36)).count("total"))
        .await
        .unwrap();
    assert_eq!(counted, vec![doc! { "total": 2 }]);
}
