//! Fixed demo sequence run by the `docdb-provisioner` binary, plus the sample
//! documents it writes.

use serde_json::Value;

use crate::backend::DocumentBackend;
use crate::client::ProvisioningClient;
use crate::errors::ClientError;
use crate::models::{Address, Child, CollectionRef, Family, Parent, Pet, Product, Store};
use crate::query::{Predicate, Query};

pub const DATABASE_ID: &str = "DocumentDbPoc";
pub const COLLECTION_ID: &str = "FamilyCollection";

/// Families and stores written by `seed_collection`.
pub const SEED_FAMILIES: usize = 100;
pub const SEED_STORES: usize = 100;
pub const PRODUCTS_PER_STORE: usize = 20;

pub fn andersen_family() -> Family {
    Family {
        id: "AndersenFamily".to_string(),
        last_name: Some("Andersen".to_string()),
        parents: vec![Parent::new("Thomas"), Parent::new("Mary Kay")],
        children: vec![Child {
            family_name: None,
            first_name: "Henriette Thaulow".to_string(),
            gender: "female".to_string(),
            grade: 5,
            pets: vec![Pet::new("Fluffy")],
        }],
        address: Address {
            state: "WA".to_string(),
            county: "King".to_string(),
            city: "Seattle".to_string(),
        },
        is_registered: true,
    }
}

pub fn wakefield_family() -> Family {
    Family {
        id: "WakefieldFamily".to_string(),
        last_name: None,
        parents: vec![
            Parent::new("Robin").with_family_name("Wakefield"),
            Parent::new("Ben").with_family_name("Miller"),
        ],
        children: vec![
            Child {
                family_name: Some("Merriam".to_string()),
                first_name: "Jesse".to_string(),
                gender: "female".to_string(),
                grade: 8,
                pets: vec![Pet::new("Goofy"), Pet::new("Shadow")],
            },
            Child {
                family_name: Some("Miller".to_string()),
                first_name: "Lisa".to_string(),
                gender: "female".to_string(),
                grade: 1,
                pets: Vec::new(),
            },
        ],
        address: Address {
            state: "NY".to_string(),
            county: "Manhattan".to_string(),
            city: "NY".to_string(),
        },
        is_registered: false,
    }
}

pub fn sample_families() -> Vec<Family> {
    vec![andersen_family(), wakefield_family()]
}

/// Generated family number `i` of the seed set.
pub fn seed_family(i: usize) -> Family {
    Family {
        id: format!("SomeFamily{}", i),
        last_name: Some(format!("FamilyName{}", i)),
        parents: vec![
            Parent::new(format!("Father{}", i)),
            Parent::new(format!("Mother{}", i)),
        ],
        children: vec![Child {
            family_name: None,
            first_name: format!("Child{}", i),
            gender: "female".to_string(),
            grade: 5,
            pets: vec![Pet::new(format!("Pet{}", i))],
        }],
        address: Address {
            state: "WA".to_string(),
            county: "King".to_string(),
            city: format!("City{}", i),
        },
        is_registered: true,
    }
}

/// Generated store number `j` of the seed set.
pub fn seed_store(j: usize, products: usize) -> Store {
    let mut store = Store::new(format!("StoreId{}", j), format!("Store{}", j));
    store.products = (0..products)
        .map(|k| Product {
            id: format!("Product{}", k),
        })
        .collect();
    store
}

/// Write the generated families and stores. Not transactional: a failure
/// part-way leaves the earlier documents in place.
pub async fn seed_collection<B: DocumentBackend>(
    client: &ProvisioningClient<B>,
    collection: &CollectionRef,
    families: usize,
    stores: usize,
) -> Result<(), ClientError> {
    for i in 0..families {
        client.upsert_document(collection, &seed_family(i)).await?;
    }
    for j in 0..stores {
        client
            .upsert_document(collection, &seed_store(j, PRODUCTS_PER_STORE))
            .await?;
    }
    tracing::info!(
        "Seeded {} families and {} stores into {}",
        families,
        stores,
        collection.path()
    );
    Ok(())
}

/// Look up the Andersen family with each query style.
pub async fn run_queries<B: DocumentBackend>(
    client: &ProvisioningClient<B>,
    collection: &CollectionRef,
) -> Result<Vec<(&'static str, Vec<Value>)>, ClientError> {
    let styles = [
        (
            "SQL",
            Query::sql("SELECT * FROM Families f WHERE f.id = \"AndersenFamily\""),
        ),
        (
            "predicate",
            Query::filter(Predicate::eq("id", "AndersenFamily")),
        ),
        (
            "closure",
            Query::matching(|f| f.field("id").eq("AndersenFamily")),
        ),
    ];

    let mut results = Vec::with_capacity(styles.len());
    for (style, query) in styles {
        let documents: Vec<Value> = client.query(collection, query).try_collect().await?;
        for document in &documents {
            tracing::info!("Read {} from {}", document, style);
        }
        results.push((style, documents));
    }
    Ok(results)
}

/// Remove the Andersen family and write it back.
pub async fn reinsert_andersen<B: DocumentBackend>(
    client: &ProvisioningClient<B>,
    collection: &CollectionRef,
) -> Result<(), ClientError> {
    let existing: Option<Family> = client
        .query_by_field(collection, "id", "AndersenFamily")
        .try_next()
        .await?;

    let family = existing.unwrap_or_else(andersen_family);
    client.delete_document(collection, &family.id).await?;
    client.upsert_document(collection, &family).await?;
    Ok(())
}

/// Ensure database and collection, write and read the sample data, and return
/// the collection.
pub async fn run<B: DocumentBackend>(
    client: &ProvisioningClient<B>,
    seed: bool,
) -> Result<CollectionRef, ClientError> {
    let database = client.ensure_database(DATABASE_ID).await?;
    let collection = client.ensure_collection(&database, COLLECTION_ID).await?;

    for family in sample_families() {
        let written = client.upsert_document(&collection, &family).await?;
        tracing::info!("{} -> {:?}", written.path, written.outcome);
    }

    if seed {
        seed_collection(client, &collection, SEED_FAMILIES, SEED_STORES).await?;
    }

    run_queries(client, &collection).await?;
    reinsert_andersen(client, &collection).await?;

    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[tokio::test]
    async fn test_demo_run_is_repeatable() {
        let client = ProvisioningClient::new(MemoryBackend::new());

        let first = run(&client, false).await.unwrap();
        let second = run(&client, false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.id, COLLECTION_ID);

        let results = run_queries(&client, &first).await.unwrap();
        assert_eq!(results.len(), 3);
        for (_, documents) in &results {
            assert_eq!(documents.len(), 1);
            assert_eq!(documents[0]["lastName"], "Andersen");
        }
        assert_eq!(client.backend().call_counts().create_database, 1);
    }

    #[tokio::test]
    async fn test_seed_collection() {
        let client = ProvisioningClient::new(MemoryBackend::new());
        let db = client.ensure_database(DATABASE_ID).await.unwrap();
        let coll = client.ensure_collection(&db, COLLECTION_ID).await.unwrap();

        seed_collection(&client, &coll, 3, 2).await.unwrap();

        let stores: Vec<Store> = client
            .query_by_field(&coll, "type", "Store")
            .try_collect()
            .await
            .unwrap();
        assert_eq!(stores.len(), 2);
        assert_eq!(stores[1].products.len(), PRODUCTS_PER_STORE);

        let families: Vec<Family> = client
            .query_by_field(&coll, "type", "Family")
            .try_collect()
            .await
            .unwrap();
        assert_eq!(families.len(), 3);
        assert_eq!(families[2].address.city, "City2");
    }

    #[test]
    fn test_wakefield_has_no_last_name() {
        let value = serde_json::to_value(wakefield_family()).unwrap();
        assert!(value.get("lastName").is_none());
        assert_eq!(value["parents"][0]["familyName"], "Wakefield");
        assert_eq!(value["children"][1]["pets"], serde_json::json!([]));
    }
}
