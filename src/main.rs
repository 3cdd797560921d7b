use std::sync::Arc;
use std::time::Duration;

use changeflow::BufferIf;
use changeflow::ChangeStreamExt;
use changeflow::ChangeflowConfig;
use changeflow::ObservableExt;
use changeflow::Observer;
use changeflow::Result;
use changeflow::SourceCache;
use changeflow::Subject;
use changeflow::TokioScheduler;
use futures::StreamExt;
use tokio::time::timeout;
use tracing::info;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[derive(Debug, Clone)]
struct Device {
    name: String,
    firmware: u32,
}

#[derive(Debug, Clone)]
struct Location {
    id: u32,
    device: String,
    room: &'static str,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let settings = ChangeflowConfig::new()?.validate()?;

    init_observability();

    let devices = SourceCache::with_config(|d: &Device| d.name.clone(), &settings.cache);
    let locations = SourceCache::with_config(|l: &Location| l.id, &settings.cache);

    let placed = devices
        .connect(None)
        .inner_join(
            locations.connect(None),
            |l: &Location| l.device.clone(),
            |name: &String, d: &Device, l: &Location| format!("{name} (fw {}) in {}", d.firmware, l.room),
        )
        .ref_count();

    let _stats = placed.clone().collect_update_stats().subscribe_fn(|summary| {
        info!(
            batch = summary.current.index,
            count = summary.current.count,
            adds = summary.overall.adds,
            removes = summary.overall.removes,
            "placement statistics"
        );
    });

    let gate: Subject<bool> = Subject::new();
    let buffered = BufferIf::new(placed, Arc::new(gate.clone()), Arc::new(TokioScheduler::current()?))
        .with_config(&settings.buffer);
    let mut updates = buffered.into_stream();

    gate.on_next(true);
    devices.edit(|updater| {
        updater.add_or_update_many([
            Device {
                name: "thermostat".into(),
                firmware: 3,
            },
            Device {
                name: "doorbell".into(),
                firmware: 7,
            },
        ])
    });
    locations.edit(|updater| {
        updater.add_or_update(Location {
            id: 1,
            device: "thermostat".into(),
            room: "hall",
        });
        updater.add_or_update(Location {
            id: 2,
            device: "doorbell".into(),
            room: "porch",
        });
    });
    info!("releasing buffered placements");
    gate.on_next(false);

    locations.remove(&2);

    while let Ok(Some(update)) = timeout(Duration::from_millis(100), updates.next()).await {
        match update {
            Ok(changes) => {
                for change in changes.iter() {
                    info!(reason = ?change.reason(), key = %change.key(), value = %change.current(), "placement");
                }
            }
            Err(error) => {
                warn!(%error, "placement stream failed");
                break;
            }
        }
    }

    info!("Exiting program.");
    Ok(())
}

fn init_observability() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .init();
}
