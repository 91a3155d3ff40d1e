//! Print the availability of every item and variation in a catalog snapshot.
//!
//! Usage: `boxoffice-report <snapshot.json>`

use std::sync::Arc;

use anyhow::{Context, bail};

use boxoffice_catalog::VariationEntry;
use boxoffice_infra::{BoxOfficeConfig, CatalogFile, InMemoryStore, ReservationService};
use boxoffice_quotas::{QuotaAvailability, StockTarget};

fn main() -> anyhow::Result<()> {
    let config = BoxOfficeConfig::from_env().context("invalid configuration")?;
    boxoffice_observability::init(config.log_format);

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: boxoffice-report <snapshot.json>");
    };

    let snapshot =
        CatalogFile::from_path(&path).with_context(|| format!("failed to load snapshot {path}"))?;
    let store = Arc::new(InMemoryStore::new());
    let service = ReservationService::new(Arc::clone(&store), &config);
    let now = service.now();
    snapshot
        .load_into(&store, now)
        .with_context(|| format!("snapshot {path} is inconsistent"))?;

    let sweep = service.sweep()?;
    tracing::info!(
        expired_orders = sweep.expired_orders.len(),
        purged_cart_positions = sweep.purged_cart_positions,
        "snapshot swept"
    );

    let properties = store.properties(snapshot.event);

    for item in store.items(snapshot.event) {
        if !item.has_properties() {
            let state = service.availability(StockTarget::Item(item.id_typed()), now)?;
            println!("{:<40} {}", item.name(), render(&state));
            continue;
        }

        for entry in item.get_all_variations(&properties)? {
            let label = format!("{} ({})", item.name(), describe(&entry));
            match entry.curated() {
                Some(variation_id) => {
                    let state = service.availability(StockTarget::Variation(variation_id), now)?;
                    println!("{label:<40} {}", render(&state));
                }
                None => println!("{label:<40} not for sale (no variation configured)"),
            }
        }
    }

    tracing::info!(journal = store.journal().len(), "report finished");
    Ok(())
}

fn describe(entry: &VariationEntry) -> String {
    entry
        .values()
        .ordered_values()
        .iter()
        .map(|v| v.value())
        .collect::<Vec<_>>()
        .join(", ")
}

fn render(state: &QuotaAvailability) -> String {
    match state.remaining {
        Some(left) => format!("{:<8} {:>3}  {left} left", state.status, state.status.code()),
        None => format!("{:<8} {:>3}  unlimited", state.status, state.status.code()),
    }
}
