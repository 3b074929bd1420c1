//! Sharded PostgreSQL integration tests.
//!
//! One container hosts two databases that act as the shards `s1` and `s2`.
//! Run with:
//!
//! ```bash
//! cargo test -p shipment --test postgres_integration -- --test-threads=1
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, Shipment, ShipmentStatus, Unit};
use serial_test::serial;
use sharding::{PgConnector, ShardRouter, ShardTopology};
use shipment::{PgShipmentStore, ShipmentStore};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    base_url: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let base_url = format!("postgres://postgres:postgres@{}:{}", host, port);

            let admin = PgPool::connect(&format!("{base_url}/postgres")).await.unwrap();
            for db in ["shard_1", "shard_2"] {
                sqlx::query(&format!("CREATE DATABASE {db}"))
                    .execute(&admin)
                    .await
                    .unwrap();
            }
            admin.close().await;

            Arc::new(ContainerInfo {
                container,
                base_url,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PgShipmentStore {
    let info = get_container_info().await;
    let topology = ShardTopology::new(
        BTreeMap::from([(0, "s1".to_string()), (1, "s2".to_string())]),
        BTreeMap::from([
            ("s1".to_string(), format!("{}/shard_1", info.base_url)),
            ("s2".to_string(), format!("{}/shard_2", info.base_url)),
        ]),
    );

    let router = Arc::new(ShardRouter::new(PgConnector::new(5)));
    router.reconfigure(&topology).await.unwrap();

    let store = PgShipmentStore::new(router);
    store.run_migrations().await.unwrap();
    for (_, pool) in store.router().snapshot().await.connections() {
        sqlx::query("TRUNCATE TABLE shipment").execute(pool).await.unwrap();
    }
    store
}

fn shipment(id: &str, order_id: &str) -> Shipment {
    Shipment {
        id: id.to_string(),
        order_id: OrderId::new_unchecked(order_id),
        seller_id: 3,
        units: vec![Unit::new("O9", 2), Unit::new("O4", 1)],
        destination_id: 77,
        status: ShipmentStatus::Created,
        created_time: Utc::now(),
    }
}

async fn count_on(store: &PgShipmentStore, server: &str) -> i64 {
    let snapshot = store.router().snapshot().await;
    let (_, pool) = snapshot
        .connections()
        .find(|(s, _)| *s == server)
        .unwrap();
    sqlx::query_scalar("SELECT COUNT(*) FROM shipment")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
#[serial]
async fn save_routes_by_customer() {
    let store = get_test_store().await;
    // fnv1_32("1") mod 2 == 0 -> s1, fnv1_32("2") mod 2 == 1 -> s2
    store.save_shipment(&shipment("a", "1-1")).await.unwrap();
    store.save_shipment(&shipment("b", "2-1")).await.unwrap();
    store.save_shipment(&shipment("c", "1-2")).await.unwrap();

    assert_eq!(count_on(&store, "s1").await, 2);
    assert_eq!(count_on(&store, "s2").await, 1);
}

#[tokio::test]
#[serial]
async fn get_shipment_scatter_gather() {
    let store = get_test_store().await;
    store.save_shipment(&shipment("b", "2-1")).await.unwrap();

    let found = store.get_shipment("b").await.unwrap();
    assert_eq!(found.order_id.as_str(), "2-1");
    assert_eq!(found.units, vec![Unit::new("O9", 2), Unit::new("O4", 1)]);
    assert_eq!(found.status, ShipmentStatus::Created);

    assert!(store.get_shipment("missing").await.unwrap_err().is_not_found());
}

#[tokio::test]
#[serial]
async fn duplicate_id_across_shards_is_internal() {
    let store = get_test_store().await;
    store.save_shipment(&shipment("dup", "1-1")).await.unwrap();
    store.save_shipment(&shipment("dup", "2-1")).await.unwrap();

    assert_eq!(store.get_shipment("dup").await.unwrap_err().status_code(), 500);
}

#[tokio::test]
#[serial]
async fn update_status_and_list_by_order() {
    let store = get_test_store().await;
    let first = shipment("a", "5-1");
    store.save_shipment(&first).await.unwrap();
    store.save_shipment(&shipment("b", "5-1")).await.unwrap();
    store.save_shipment(&shipment("c", "5-2")).await.unwrap();

    store
        .update_status(&first, ShipmentStatus::AcceptDelivery)
        .await
        .unwrap();
    assert_eq!(
        store.get_shipment("a").await.unwrap().status,
        ShipmentStatus::AcceptDelivery
    );

    let listed = store
        .get_shipments_by_order(&OrderId::new_unchecked("5-1"))
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);

    let err = store
        .update_status(&shipment("ghost", "5-1"), ShipmentStatus::Packing)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
