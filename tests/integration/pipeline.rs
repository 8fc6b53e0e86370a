//! End-to-end collection scenarios
//!
//! These tests drive the public collection pipeline against a fake backend:
//! - Bucket counting and row filtering across the fan-out
//! - Tag filters and single-server metrics
//! - Server discovery feeding the collector

use std::sync::Arc;

use pretty_assertions::assert_eq;
use rfc_exporter::{
    collector::{Collector, Invoker},
    discovery::discover_servers,
    value::Row,
};

use crate::helpers::*;

fn ticket_rows() -> Vec<Row> {
    vec![
        row(&[("STATUS", "Open"), ("PRIORITY", "High")]),
        row(&[("STATUS", "Closed"), ("PRIORITY", "Low")]),
        row(&[("STATUS", "open"), ("PRIORITY", "Low")]),
    ]
}

#[tokio::test]
async fn test_bucket_counts() {
    let connector = Arc::new(FakeConnector::new().table("Z_TICKETS", "TICKETS", ticket_rows()));
    let mut metric = create_test_metric("tickets", "Z_TICKETS", "TICKETS");
    metric.row_count = buckets("status", &["open", "closed", "total"]);

    let collector = Collector::new(
        vec![metric],
        vec![create_test_system("PRD", &[], &["app1"])],
        connector,
    );
    let result = collector.collect().await;

    assert_eq!(
        samples(&result),
        vec![
            sample("tickets", "app1", "status_closed", 1.0),
            sample("tickets", "app1", "status_open", 2.0),
            sample("tickets", "app1", "status_total", 3.0),
        ]
    );

    let stat = &result[0].stats[0];
    assert_eq!(stat.label("system"), Some("prd"));
    assert_eq!(stat.label("usage"), Some("production"));
}

#[tokio::test]
async fn test_row_filter_before_counting() {
    let connector = Arc::new(FakeConnector::new().table(
        "Z_TICKETS",
        "TICKETS",
        vec![
            row(&[("STATUS", "Open"), ("PRIORITY", "High")]),
            row(&[("STATUS", "Open"), ("PRIORITY", "Low")]),
        ],
    ));
    let mut metric = create_test_metric("tickets", "Z_TICKETS", "TICKETS");
    metric.row_filter = buckets("priority", &["high"]);
    metric.row_count = buckets("status", &["open"]);

    let collector = Collector::new(
        vec![metric],
        vec![create_test_system("PRD", &[], &["app1"])],
        connector,
    );
    let result = collector.collect().await;

    assert_eq!(
        samples(&result),
        vec![sample("tickets", "app1", "status_open", 1.0)]
    );
}

#[tokio::test]
async fn test_tag_filter_skips_system_without_calls() {
    let connector = Arc::new(FakeConnector::new().table("Z_TICKETS", "TICKETS", ticket_rows()));
    let mut metric = create_test_metric("tickets", "Z_TICKETS", "TICKETS");
    metric.tag_filter = vec!["prod".to_string()];
    metric.row_count = buckets("status", &["open"]);

    let collector = Collector::new(
        vec![metric],
        vec![create_test_system("DEV", &["dev"], &["dev1", "dev2"])],
        connector.clone(),
    );
    let result = collector.collect().await;

    assert_eq!(result.len(), 1);
    assert!(result[0].stats.is_empty());
    assert_eq!(connector.connect_count(), 0);
    assert_eq!(connector.call_count(), 0);
}

#[tokio::test]
async fn test_tag_filter_only_connects_matching_systems() {
    let connector = Arc::new(FakeConnector::new().table("Z_TICKETS", "TICKETS", ticket_rows()));
    let mut metric = create_test_metric("tickets", "Z_TICKETS", "TICKETS");
    metric.tag_filter = vec!["prod".to_string()];
    metric.row_count = buckets("status", &["total"]);

    let collector = Collector::new(
        vec![metric],
        vec![
            create_test_system("PRD", &["prod"], &["prd1"]),
            create_test_system("DEV", &["dev"], &["dev1", "dev2"]),
        ],
        connector.clone(),
    );
    let result = collector.collect().await;

    assert_eq!(
        samples(&result),
        vec![sample("tickets", "prd1", "status_total", 3.0)]
    );
    assert_eq!(connector.connect_count(), 1);
    assert_eq!(connector.called_servers(), vec!["prd1"]);
}

#[tokio::test]
async fn test_invoker_skips_irrelevant_target() {
    let connector = Arc::new(FakeConnector::new().table("Z_TICKETS", "TICKETS", ticket_rows()));
    let mut metric = create_test_metric("tickets", "Z_TICKETS", "TICKETS");
    metric.tag_filter = vec!["prod".to_string(), "erp".to_string()];
    let system = create_test_system("PRD", &["prod"], &["app1"]);

    let invoker = Invoker::new(connector.clone());

    assert_eq!(
        invoker
            .invoke(&metric, &system, &system.servers[0], None)
            .await,
        None
    );
    assert_eq!(connector.connect_count(), 0);
    assert_eq!(connector.call_count(), 0);
}

#[tokio::test]
async fn test_single_server_metric_calls_first_server_only() {
    let connector = Arc::new(FakeConnector::new().table("Z_TICKETS", "TICKETS", ticket_rows()));
    let mut metric = create_test_metric("tickets", "Z_TICKETS", "TICKETS");
    metric.all_servers = false;
    metric.row_count = buckets("status", &["total"]);

    let collector = Collector::new(
        vec![metric],
        vec![create_test_system("PRD", &[], &["app1", "app2", "app3"])],
        connector.clone(),
    );
    let result = collector.collect().await;

    assert_eq!(connector.called_servers(), vec!["app1".to_string()]);
    assert_eq!(
        samples(&result),
        vec![sample("tickets", "app1", "status_total", 3.0)]
    );
}

#[tokio::test]
async fn test_collect_is_idempotent() {
    let connector = Arc::new(FakeConnector::new().table("Z_TICKETS", "TICKETS", ticket_rows()));
    let mut metric = create_test_metric("tickets", "Z_TICKETS", "TICKETS");
    metric.row_count = buckets("status", &["open", "total"]);

    let collector = Collector::new(
        vec![metric],
        vec![
            create_test_system("PRD", &[], &["app1", "app2"]),
            create_test_system("QAS", &[], &["qas1"]),
        ],
        connector,
    );

    let first = samples(&collector.collect().await);
    let second = samples(&collector.collect().await);

    assert_eq!(first.len(), 6);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_discovered_servers_are_collected() {
    let list = vec![
        row(&[("NAME", "prdapp1_PRD_00")]),
        row(&[("NAME", "prdapp2_PRD_01")]),
    ];
    let connector = Arc::new(
        FakeConnector::new()
            .table("TH_SERVER_LIST", "LIST", list)
            .table("Z_TICKETS", "TICKETS", ticket_rows()),
    );

    let mut systems = vec![create_test_system("PRD", &[], &[])];
    discover_servers(connector.as_ref(), &mut systems).await;

    let servers: Vec<_> = systems[0]
        .servers
        .iter()
        .map(|server| (server.name.as_str(), server.sysnr.as_str()))
        .collect();
    assert_eq!(servers, vec![("prdapp1", "00"), ("prdapp2", "01")]);

    let mut metric = create_test_metric("tickets", "Z_TICKETS", "TICKETS");
    metric.row_count = buckets("status", &["total"]);
    let collector = Collector::new(vec![metric], systems, connector);

    assert_eq!(
        samples(&collector.collect().await),
        vec![
            sample("tickets", "prdapp1", "status_total", 3.0),
            sample("tickets", "prdapp2", "status_total", 3.0),
        ]
    );
}
