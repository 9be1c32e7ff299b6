// pulled into each bench through include!() instead of living in a lib
// target, so it is only compiled alongside the benches
use graphcache::json_ext::Object;
use graphcache::CacheConfig;
use graphcache::Schema;
use graphcache::Store;
use once_cell::sync::Lazy;
use serde_json_bytes::json;
use serde_json_bytes::Value;

static SCHEMA: &str = r#"
type Query {
  users(first: Int): [User]
}
type User {
  id: ID!
  name: String
  friends(first: Int): [User]
}
"#;

static QUERY: &str = r#"{
    users(first: 100) {
        __typename
        id
        name
        friends(first: 1) { __typename id name }
    }
}"#;

static PAYLOAD: Lazy<Value> = Lazy::new(|| {
    let users: Vec<Value> = (0..100)
        .map(|n: u32| {
            let friend = (n + 1) % 100;
            json!({
                "__typename": "User",
                "id": n.to_string(),
                "name": format!("user{n}"),
                "friends": [{
                    "__typename": "User",
                    "id": friend.to_string(),
                    "name": format!("user{friend}"),
                }],
            })
        })
        .collect();
    json!({ "users": users })
});

fn setup() -> Store {
    let schema = Schema::parse(SCHEMA).expect("the benchmark schema must parse");
    Store::new(schema, CacheConfig::default())
}

fn write_payload(store: &mut Store) {
    store
        .write(QUERY, None, &Object::default(), PAYLOAD.as_object().unwrap())
        .expect("the benchmark write must succeed");
}

fn read_payload(store: &mut Store) {
    let result = store
        .read(QUERY, None, &Object::default())
        .expect("the benchmark read must succeed");
    assert!(result.complete);
}
