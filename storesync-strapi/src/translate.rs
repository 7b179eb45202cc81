//! Translation between the commerce and CMS naming conventions.
//!
//! The commerce side names relations with dashes (`product-type`) and keys
//! records by `id`. The CMS names relations with underscores (`product_type`),
//! owns its own numeric `id`, and stores the commerce id as `medusa_id`.
//!
//! Every function here is pure: it takes a borrowed value and returns a new
//! one, leaving the input untouched.

use serde_json::{Map, Value};

/// Keys dropped from entity-like objects on the way out.
const STRIPPED_KEYS: [&str; 4] = ["id", "created_at", "updated_at", "deleted_at"];

/// Product relations the CMS models as separately named content types.
const PRODUCT_RELATION_KEYS: [&str; 6] = [
    "collection",
    "categories",
    "type",
    "tags",
    "variants",
    "options",
];

/// Whether `value` is an object carrying `id` or `medusa_id`.
pub fn is_entity(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.contains_key("id") || o.contains_key("medusa_id"))
}

/// Whether a field holds a relation.
///
/// Empty arrays and objects have no sample to classify and are never
/// relations.
fn is_relation(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.first().is_some_and(is_entity),
        Value::Object(_) => is_entity(value),
        _ => false,
    }
}

fn rename_first(key: &str, from: char, to: char) -> String {
    key.replacen(from, &to.to_string(), 1)
}

fn map_relation(value: &Value, f: fn(&Value) -> Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| if is_entity(item) { f(item) } else { item.clone() })
                .collect(),
        ),
        other => f(other),
    }
}

/// Reshape a commerce record for the CMS.
///
/// Relation keys have their first `-` replaced with `_` and are translated
/// recursively. On entity-like objects `id` is copied to `medusa_id` and
/// the keys `id`, `created_at`, `updated_at` and `deleted_at` are removed.
/// Plain nested data is copied as-is.
pub fn to_external(value: &Value) -> Value {
    let Some(object) = value.as_object() else {
        return value.clone();
    };
    let entity = is_entity(value);
    let mut out = Map::with_capacity(object.len());

    for (key, field) in object {
        if is_relation(field) {
            out.insert(rename_first(key, '-', '_'), map_relation(field, to_external));
        } else if entity && STRIPPED_KEYS.contains(&key.as_str()) {
            continue;
        } else if !out.contains_key(key) {
            out.insert(key.clone(), field.clone());
        }
    }

    if let Some(id) = object.get("id").filter(|id| !id.is_object() && !id.is_array()) {
        out.insert("medusa_id".to_string(), id.clone());
    }

    Value::Object(out)
}

/// Reshape a CMS record for the commerce side.
///
/// Relation keys have their first `_` replaced with `-` (`medusa_id` is
/// never renamed). The CMS's own `id` and timestamps are dropped and `id`
/// is restored from `medusa_id`, which is kept.
pub fn to_internal(value: &Value) -> Value {
    let Some(object) = value.as_object() else {
        return value.clone();
    };
    let entity = is_entity(value);
    let mut out = Map::with_capacity(object.len() + 1);

    for (key, field) in object {
        if key != "medusa_id" && is_relation(field) {
            out.insert(rename_first(key, '_', '-'), map_relation(field, to_internal));
        } else if entity && STRIPPED_KEYS.contains(&key.as_str()) {
            continue;
        } else if !out.contains_key(key) {
            out.insert(key.clone(), field.clone());
        }
    }

    if let Some(medusa_id) = object.get("medusa_id") {
        out.insert("id".to_string(), medusa_id.clone());
    }

    Value::Object(out)
}

/// Rename every scalar `id` key, at any depth, to `medusa_id`.
pub fn ids_to_medusa_ids(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(ids_to_medusa_ids).collect()),
        Value::Object(object) => {
            let mut out = Map::with_capacity(object.len());
            for (key, field) in object {
                match field {
                    Value::Array(_) | Value::Object(_) => {
                        out.insert(key.clone(), ids_to_medusa_ids(field));
                    }
                    _ if key == "id" => {
                        out.insert("medusa_id".to_string(), field.clone());
                    }
                    _ => {
                        out.entry(key.clone()).or_insert_with(|| field.clone());
                    }
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Prefix the product relation keys with `product_` before a CMS write.
///
/// `collection` becomes `product_collection`, `tags` becomes
/// `product_tags`, and so on. Absent keys are left absent.
pub fn adjust_product_keys(product: &Value) -> Value {
    let Some(object) = product.as_object() else {
        return product.clone();
    };
    let mut out = object.clone();
    for key in PRODUCT_RELATION_KEYS {
        if let Some(field) = out.remove(key) {
            out.insert(format!("product_{key}"), field);
        }
    }
    Value::Object(out)
}

/// Product shape used by seed exports.
pub fn seed_product(product: &Value) -> Value {
    let Some(object) = product.as_object() else {
        return product.clone();
    };
    let mut out = object.clone();

    for (from, to) in [
        ("type", "product-type"),
        ("tags", "product-tags"),
        ("options", "product-options"),
        ("variants", "product-variants"),
    ] {
        if let Some(field) = out.remove(from) {
            out.insert(to.to_string(), field);
        }
    }

    if let Some(collection) = out.remove("collection").filter(|c| !c.is_null()) {
        out.insert("product-collections".to_string(), collection);
    }
    if let Some(categories) = out.get("categories").filter(|c| !c.is_null()).cloned() {
        out.insert("product-categories".to_string(), categories);
    }

    Value::Object(out)
}

/// Variant shape used when creating a variant in the CMS.
pub fn variant_for_create(variant: &Value) -> Value {
    let Some(object) = variant.as_object() else {
        return variant.clone();
    };
    let mut out = object.clone();
    if let Some(prices) = out.remove("prices") {
        out.insert("money_amount".to_string(), prices);
    }
    if let Some(options) = out.remove("options") {
        out.insert("product_option_value".to_string(), options);
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_external_renames_relations() {
        let product = json!({
            "id": "prod_1",
            "title": "Shirt",
            "created_at": "2024-01-01",
            "product-type": {"id": "ptyp_1", "value": "apparel"},
            "product-tags": [{"id": "ptag_1", "value": "summer"}],
            "metadata": {"color-code": "red"},
        });

        let out = to_external(&product);
        assert_eq!(out["medusa_id"], "prod_1");
        assert!(out.get("id").is_none());
        assert!(out.get("created_at").is_none());
        assert_eq!(out["product_type"]["medusa_id"], "ptyp_1");
        assert!(out["product_type"].get("id").is_none());
        assert_eq!(out["product_tags"][0]["medusa_id"], "ptag_1");
        assert_eq!(out["metadata"], json!({"color-code": "red"}));
        assert!(out.get("product-type").is_none());
    }

    #[test]
    fn test_to_external_leaves_input_untouched() {
        let product = json!({"id": "prod_1", "product-type": {"id": "t"}});
        let snapshot = product.clone();
        let _ = to_external(&product);
        assert_eq!(product, snapshot);
    }

    #[test]
    fn test_empty_collections_are_not_relations() {
        let product = json!({"id": "p", "sales-channels": [], "extra-data": {}});
        let out = to_external(&product);
        assert_eq!(out["sales-channels"], json!([]));
        assert_eq!(out["extra-data"], json!({}));
    }

    #[test]
    fn test_id_wins_over_existing_medusa_id() {
        let out = to_external(&json!({"id": "new", "medusa_id": "old"}));
        assert_eq!(out["medusa_id"], "new");
    }

    #[test]
    fn test_only_first_separator_is_renamed() {
        let out = to_external(&json!({"id": "p", "a-b-c": {"id": "x"}}));
        assert!(out.get("a_b-c").is_some());
    }

    #[test]
    fn test_round_trip() {
        let product = json!({
            "id": "prod_1",
            "title": "Shirt",
            "updated_at": "2024-01-01",
            "product-type": {"id": "ptyp_1", "value": "apparel"},
            "product-variants": [{"id": "var_1", "title": "S"}],
        });

        let back = to_internal(&to_external(&product));
        assert_eq!(back["id"], "prod_1");
        assert_eq!(back["title"], "Shirt");
        assert_eq!(back["product-type"]["id"], "ptyp_1");
        assert_eq!(back["product-variants"][0]["id"], "var_1");
        assert!(back.get("updated_at").is_none());
    }

    #[test]
    fn test_to_internal_drops_cms_id() {
        let entry = json!({"id": 42, "medusa_id": "prod_1", "currency_code": "usd"});
        let out = to_internal(&entry);
        assert_eq!(out["id"], "prod_1");
        assert_eq!(out["medusa_id"], "prod_1");
        assert_eq!(out["currency_code"], "usd");
    }

    #[test]
    fn test_ids_to_medusa_ids() {
        let data = json!({
            "products": [{"id": "p1", "variants": [{"id": "v1"}]}],
            "stores": [{"id": "s1", "name": "main"}],
        });
        let out = ids_to_medusa_ids(&data);
        assert_eq!(out["products"][0]["medusa_id"], "p1");
        assert_eq!(out["products"][0]["variants"][0]["medusa_id"], "v1");
        assert!(out["stores"][0].get("id").is_none());
    }

    #[test]
    fn test_adjust_product_keys() {
        let out = adjust_product_keys(&json!({
            "id": "p",
            "collection": {"id": "c"},
            "tags": [],
        }));
        assert_eq!(out["product_collection"]["id"], "c");
        assert_eq!(out["product_tags"], json!([]));
        assert!(out.get("collection").is_none());
        assert!(out.get("product_variants").is_none());
    }

    #[test]
    fn test_seed_product() {
        let out = seed_product(&json!({
            "id": "p",
            "type": {"id": "t"},
            "collection": null,
            "categories": [{"id": "c"}],
        }));
        assert_eq!(out["product-type"]["id"], "t");
        assert!(out.get("collection").is_none());
        assert!(out.get("product-collections").is_none());
        assert_eq!(out["product-categories"], out["categories"]);
    }

    #[test]
    fn test_variant_for_create() {
        let out = variant_for_create(&json!({"id": "v", "prices": [1], "options": [2]}));
        assert_eq!(out["money_amount"], json!([1]));
        assert_eq!(out["product_option_value"], json!([2]));
        assert!(out.get("prices").is_none());
    }
}
