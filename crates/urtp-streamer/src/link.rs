//! Network link bring-up.
//!
//! The pipeline only consumes a narrow contract here: by the time the
//! socket opens, the link is up. On the host, Ethernet means the
//! operating system's interface; a cellular PPP link is owned by the
//! platform's PPP daemon and this process only validates that the
//! credentials it would need are present.

use anyhow::{bail, Result};
use urtp_icd::{CellularConfig, Link};

pub fn bring_up(link: Link, cellular: &CellularConfig) -> Result<()> {
    match link {
        Link::Ethernet => {
            log::info!("connecting via the Ethernet interface");
            Ok(())
        }
        Link::CellularPpp => {
            if cellular.pin.is_none() {
                bail!("cellular-ppp link requires --pin");
            }
            match &cellular.apn {
                Some(apn) => log::info!(
                    "connecting via cellular PPP, APN {apn}; this can take \
                     up to 180 seconds"
                ),
                // With no APN configured a lookup against the known
                // network list is attempted by the modem side.
                None => log::info!(
                    "connecting via cellular PPP with APN lookup; this can \
                     take up to 180 seconds"
                ),
            }
            Ok(())
        }
    }
}
