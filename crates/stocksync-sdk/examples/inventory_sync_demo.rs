//! 库存同步演示
//!
//! 使用 sled 状态库 + 内存目录 + 模拟远端，演示全量 / 增量同步、看门狗跳过与定时调度

use std::path::PathBuf;
use std::sync::Arc;

use stocksync_sdk::{
    CatalogRow, InMemoryCatalog, InventorySyncConfig, InventorySyncService, KvStore,
    MockInventoryClient, ScheduleConfig, SyncKind, SystemClock,
};
use tokio::time::{sleep, Duration};

fn demo_catalog() -> Vec<CatalogRow> {
    let now = chrono::Utc::now();
    (0..1234u64)
        .map(|i| CatalogRow {
            variation_id: i,
            item_id: i / 4,
            variation_number: if i % 50 == 0 { None } else { Some(format!("VN-{:05}", i)) },
            name: format!("Demo Item {}", i / 4),
            options: vec![["S", "M", "L", "XL"][(i % 4) as usize].to_string()],
            is_active: true,
            stock_net: (i % 13) as i64 - 3,
            on_order: (i % 5) as i64,
            updated_at: if i % 10 == 0 { now } else { now - chrono::Duration::days(1) },
            ..Default::default()
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("========================================");
    println!("库存同步演示");
    println!("========================================\n");

    let data_dir = PathBuf::from("/tmp/data/stocksync_demo");
    let config = InventorySyncConfig::builder()
        .data_dir(&data_dir)
        .supplier_id("DEMO-SUPPLIER")
        .page_size(500)
        .schedule(ScheduleConfig {
            full_interval_secs: 3600,
            partial_interval_secs: 5,
            run_on_start: false,
        })
        .build();

    let kv = KvStore::open(&data_dir).await?;
    let client = Arc::new(MockInventoryClient::new().reject_items_on_call(3, 1));
    let service = InventorySyncService::from_parts(
        config,
        Arc::new(kv.clone()),
        Arc::new(InMemoryCatalog::new(demo_catalog())),
        client.clone(),
        Arc::new(SystemClock),
    )?;

    service
        .events()
        .add_listener("run_summary", |event| println!("📊 {:?}", event))
        .await;

    // === 1. 全量同步 ===
    let report = service.trigger(SyncKind::Full, true).await;
    println!(
        "全量同步: {} -> {}\n",
        report.disposition.as_str(),
        serde_json::to_string_pretty(&report.status)?
    );

    // === 2. 增量同步（最近 80 分钟内变更的行）===
    let report = service.trigger(SyncKind::Partial, true).await;
    println!("增量同步: {} {:?}\n", report.disposition.as_str(), report.aggregate);

    // === 3. 定时调度 ===
    let scheduler = service.start_scheduler();
    scheduler.trigger(SyncKind::Full)?;
    sleep(Duration::from_secs(6)).await;
    scheduler.shutdown().await;

    println!("远端共收到 {} 个批次", client.call_count());
    println!("事件统计: {:?}", service.events().get_stats().await);

    // === 4. 清除状态 ===
    service.clear_all().await;
    kv.flush().await?;
    println!("清除后: {}", serde_json::to_string(&service.status().await)?);

    Ok(())
}
