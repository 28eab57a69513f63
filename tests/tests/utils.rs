use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[allow(unused)]
pub const MOCK_HOST: &str = "http://127.0.0.1:3002";

const MOCK_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 3002);
const METRICS_PORT: u16 = 8002;

/// Logging, a Prometheus endpoint and the mock service, once per test binary.
#[allow(unused)]
pub async fn init() {
    static SETUP: OnceLock<()> = OnceLock::new();

    SETUP.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
            std::process::exit(1);
        }));

        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("horde=debug,mock_service=debug,axum::rejection=trace")
            }))
            .init();

        PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], METRICS_PORT)))
            .install()
            .unwrap();

        // Every #[tokio::test] owns a runtime that dies with it.
        std::thread::Builder::new()
            .name("mock-service".into())
            .spawn(|| {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    if let Err(err) = mock_service::run(SocketAddr::from(MOCK_ADDR)).await {
                        error!("Mock service failed: {err}");
                    }
                });
            })
            .unwrap();
    });

    wait_for_mock().await;
}

async fn wait_for_mock() {
    let addr = SocketAddr::from(MOCK_ADDR);
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("mock service not listening on {addr}");
}
