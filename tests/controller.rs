mod common;

use futures_util::StreamExt;
use neuralyzer_light::config::LightConfig;
use neuralyzer_light::core::bluetooth::ConnectionState;
use neuralyzer_light::LightController;
use tokio::time::timeout;

use common::{next_op, wait_for_state, MockLinkTransport, MockScanTransport, Op, Permissions, WAIT};

#[tokio::test]
async fn connecting_forgets_discovered_lights() {
    neuralyzer_light::logging::init_test_logging();
    let scan = MockScanTransport::new();
    let (link, mut ops) = MockLinkTransport::new(&["AA:AA"]);
    let controller = LightController::new(
        scan.clone(),
        link,
        Permissions::granted(),
        LightConfig::default(),
    );

    controller.start_scan().await.unwrap();
    let mut discoveries = controller.scanner.take_discoveries().unwrap();
    scan.advertise("AA:AA");
    let found = timeout(WAIT, discoveries.next()).await.unwrap().unwrap();

    controller.connect(found.address).await.unwrap();
    assert_eq!(next_op(&mut ops).await, Op::Open("AA:AA".to_string()));
    wait_for_state(&controller.session, ConnectionState::Connecting).await;
    assert!(controller.scanner.cached().is_empty());

    // Still scanning, so the same light is reported again.
    scan.advertise("AA:AA");
    let again = timeout(WAIT, discoveries.next()).await.unwrap().unwrap();
    assert_eq!(again.address.as_str(), "AA:AA");

    controller.shutdown().await;
}

#[tokio::test]
async fn stopping_the_scan_clears_the_cache() {
    neuralyzer_light::logging::init_test_logging();
    let scan = MockScanTransport::new();
    let (link, _ops) = MockLinkTransport::new(&[]);
    let controller = LightController::new(
        scan.clone(),
        link,
        Permissions::granted(),
        LightConfig::default(),
    );

    controller.start_scan().await.unwrap();
    let mut discoveries = controller.scanner.take_discoveries().unwrap();
    scan.advertise("AA:AA");
    timeout(WAIT, discoveries.next()).await.unwrap().unwrap();
    assert_eq!(controller.scanner.cached().len(), 1);

    controller.stop_scan().await.unwrap();
    assert!(controller.scanner.cached().is_empty());
    assert_eq!(scan.stops(), 1);
}
