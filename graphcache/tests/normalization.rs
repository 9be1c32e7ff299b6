use graphcache::json_ext::Object;
use graphcache::json_ext::ValueExt;
use graphcache::CacheConfig;
use graphcache::ReadOutcome;
use graphcache::ReadResult;
use graphcache::Schema;
use graphcache::Store;
use graphcache::WriteResult;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;
use serde_json_bytes::Value;
use test_log::test;

const SCHEMA: &str = r#"
type Query {
  me: User
  user(id: ID!): User
  person: Person
  launches(first: Int): [Launch]
}
type Mutation {
  rename(id: ID!, name: String!): User
}
union Person = Friend | Foe
interface Node {
  id: ID!
}
type Friend implements Node {
  id: ID!
  name: String
}
type Foe implements Node {
  id: ID!
  age: Int
}
type User {
  id: ID!
  name: String
  profile: Profile
  friends(first: Int): [User]
}
type Profile {
  bio: String
}
type Launch {
  id: ID!
  site: String
}
"#;

fn store() -> Store {
    Store::new(Schema::parse(SCHEMA).unwrap(), CacheConfig::default())
}

fn write(store: &mut Store, query: &str, payload: Value) -> WriteResult {
    store
        .write(query, None, &Object::default(), payload.as_object().unwrap())
        .unwrap()
}

fn read(store: &mut Store, query: &str) -> ReadResult {
    store.read(query, None, &Object::default()).unwrap()
}

#[test]
fn written_data_reads_back_unchanged() {
    let mut store = store();
    let query = r#"{
        me {
            __typename
            id
            name
            friends(first: 2) { __typename id name }
        }
    }"#;
    let payload = json!({
        "me": {
            "__typename": "User",
            "id": "1",
            "name": "Ada",
            "friends": [
                { "__typename": "User", "id": "2", "name": "Grace" },
                { "__typename": "User", "id": "3", "name": "Margaret" },
            ],
        },
    });
    write(&mut store, query, payload.clone());

    let result = read(&mut store, query);
    assert_eq!(result.outcome(), ReadOutcome::Hit);
    let data = result.data.unwrap();
    assert_eq!(data, payload);
    // Fields come back in the order the operation selected them.
    assert!(data.eq_and_ordered(&payload));
}

#[test]
fn reading_an_empty_store_is_a_miss() {
    let mut store = store();
    let result = read(&mut store, "{ me { id name } }");
    assert_eq!(result.outcome(), ReadOutcome::Miss);
    assert!(result.data.is_none());
    assert!(!result.dependencies.is_empty());
}

#[test]
fn writing_the_same_payload_twice_changes_nothing() {
    let mut store = store();
    let query = "{ me { id name friends(first: 1) { id name } } }";
    let payload = json!({
        "me": {
            "id": "1",
            "name": "Ada",
            "friends": [{ "id": "2", "name": "Grace" }],
        },
    });

    let first = write(&mut store, query, payload.clone());
    let after_first = serde_json::to_value(store.snapshot()).unwrap();
    let second = write(&mut store, query, payload);
    let after_second = serde_json::to_value(store.snapshot()).unwrap();

    assert_eq!(first.touched, second.touched);
    assert_eq!(after_first, after_second);
}

#[test]
fn distinct_arguments_store_distinct_entries() {
    let mut store = store();
    write(
        &mut store,
        r#"{ user(id: "1") { id name } }"#,
        json!({ "user": { "id": "1", "name": "Ada" } }),
    );
    write(
        &mut store,
        r#"{ user(id: "2") { id name } }"#,
        json!({ "user": { "id": "2", "name": "Grace" } }),
    );

    let one = read(&mut store, r#"{ user(id: "1") { id name } }"#);
    let two = read(&mut store, r#"{ user(id: "2") { id name } }"#);
    assert_eq!(
        one.data.unwrap(),
        json!({ "user": { "id": "1", "name": "Ada" } }),
    );
    assert_eq!(
        two.data.unwrap(),
        json!({ "user": { "id": "2", "name": "Grace" } }),
    );
}

#[test]
fn aliases_of_one_field_do_not_collide() {
    let mut store = store();
    let query = r#"{
        first: user(id: "1") { id name }
        second: user(id: "2") { id name }
    }"#;
    let payload = json!({
        "first": { "id": "1", "name": "Ada" },
        "second": { "id": "2", "name": "Grace" },
    });
    write(&mut store, query, payload.clone());

    let result = read(&mut store, query);
    assert_eq!(result.outcome(), ReadOutcome::Hit);
    assert_eq!(result.data.unwrap(), payload);
}

#[test]
fn fragment_fields_reach_only_matching_types() {
    let mut store = store();
    let query = r#"{
        person {
            __typename
            ... on Node { id }
            ... on Friend { name }
        }
    }"#;

    write(
        &mut store,
        query,
        json!({ "person": { "__typename": "Friend", "id": "f1", "name": "Ada" } }),
    );
    let friend = read(&mut store, query);
    assert_eq!(friend.outcome(), ReadOutcome::Hit);
    assert_eq!(
        friend.data.unwrap(),
        json!({ "person": { "__typename": "Friend", "id": "f1", "name": "Ada" } }),
    );

    // A Foe never selects name, so a payload without it is still complete.
    write(
        &mut store,
        query,
        json!({ "person": { "__typename": "Foe", "id": "e1" } }),
    );
    let foe = read(&mut store, query);
    assert_eq!(foe.outcome(), ReadOutcome::Hit);
    assert_eq!(
        foe.data.unwrap(),
        json!({ "person": { "__typename": "Foe", "id": "e1" } }),
    );
}

#[test]
fn embedded_objects_belong_to_their_parent() {
    let mut store = store();
    let query = r#"{
        first: user(id: "1") { id profile { bio } }
        second: user(id: "2") { id profile { bio } }
    }"#;
    write(
        &mut store,
        query,
        json!({
            "first": { "id": "1", "profile": { "bio": "hello" } },
            "second": { "id": "2", "profile": { "bio": "hello" } },
        }),
    );

    // Rewriting one parent's profile must not leak into the other parent.
    write(
        &mut store,
        r#"{ first: user(id: "1") { id profile { bio } } }"#,
        json!({ "first": { "id": "1", "profile": { "bio": "changed" } } }),
    );

    let result = read(&mut store, query);
    assert_eq!(
        result.data.unwrap(),
        json!({
            "first": { "id": "1", "profile": { "bio": "changed" } },
            "second": { "id": "2", "profile": { "bio": "hello" } },
        }),
    );
}

#[test]
fn absent_fields_clear_while_explicit_null_stays_readable() {
    let mut store = store();
    let query = "{ me { id name } }";
    write(
        &mut store,
        query,
        json!({ "me": { "id": "1", "name": "Ada" } }),
    );

    // The same selection answered without the field drops the cached value.
    write(&mut store, query, json!({ "me": { "id": "1" } }));
    let cleared = read(&mut store, query);
    assert_eq!(cleared.outcome(), ReadOutcome::Partial);
    assert_eq!(cleared.data.unwrap(), json!({ "me": { "id": "1" } }));

    // An explicit null is data, not absence.
    write(&mut store, query, json!({ "me": { "id": "1", "name": null } }));
    let nulled = read(&mut store, query);
    assert_eq!(nulled.outcome(), ReadOutcome::Hit);
    assert_eq!(nulled.data.unwrap(), json!({ "me": { "id": "1", "name": null } }));
}

#[test]
fn mismatched_payload_shapes_do_not_clobber_good_data() {
    let mut store = store();
    let query = "{ me { id name } }";
    write(
        &mut store,
        query,
        json!({ "me": { "id": "1", "name": "Ada" } }),
    );

    // `me` arrives as a scalar: that field is skipped, the write goes on.
    write(&mut store, query, json!({ "me": "broken" }));

    let result = read(&mut store, query);
    assert_eq!(result.outcome(), ReadOutcome::Hit);
    assert_eq!(result.data.unwrap(), json!({ "me": { "id": "1", "name": "Ada" } }));
}

#[test]
fn list_positions_and_nulls_survive_the_round_trip() {
    let mut store = store();
    let query = "{ launches(first: 3) { id site } }";
    let payload = json!({
        "launches": [
            { "id": "l1", "site": "KSC" },
            null,
            { "id": "l2", "site": "VAFB" },
        ],
    });
    write(&mut store, query, payload.clone());

    let result = read(&mut store, query);
    assert_eq!(result.outcome(), ReadOutcome::Hit);
    assert_eq!(result.data.unwrap(), payload);
}

#[test]
fn variables_and_defaults_select_the_same_cache_entries() {
    let mut store = store();
    write(
        &mut store,
        r#"{ launches(first: 2) { id site } }"#,
        json!({ "launches": [{ "id": "l1", "site": "KSC" }, { "id": "l2", "site": "VAFB" }] }),
    );

    // The same field reached through a variable with a matching value.
    let result = store
        .read(
            "query Launches($n: Int) { launches(first: $n) { id site } }",
            None,
            json!({ "n": 2 }).as_object().unwrap(),
        )
        .unwrap();
    assert_eq!(result.outcome(), ReadOutcome::Hit);

    // A defaulted variable resolves before keying too.
    let defaulted = store
        .read(
            "query Launches($n: Int = 2) { launches(first: $n) { id site } }",
            None,
            &Object::default(),
        )
        .unwrap();
    assert_eq!(defaulted.outcome(), ReadOutcome::Hit);
}

#[test]
fn unknown_fields_fail_the_operation() {
    let mut store = store();
    let error = store
        .read("{ me { id nickname } }", None, &Object::default())
        .unwrap_err();
    assert!(error.to_string().contains("nickname"));
}
