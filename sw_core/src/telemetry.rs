use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Default filter: shellwatch at info, chatty dependencies at warn.
/// sqlx logs every statement at info and hyper/reqwest trace connection
/// churn, which drowns the capture loop on a Pi console.
const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn,reqwest=warn";

/// Initialize tracing once; later calls are no-ops. `RUST_LOG` overrides
/// the default filter. Production gets JSON lines for journald scraping,
/// everything else a compact human-readable format.
pub fn init_tracing(environment: &str, service: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        if environment == "production" {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().json())
                .with(filter)
                .init();
        } else {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().compact().with_target(false))
                .with(filter)
                .init();
        }

        tracing::info!(service, environment, "Tracing initialized");
    });
}
