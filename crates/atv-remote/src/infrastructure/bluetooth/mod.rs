//! Bluetooth LE infrastructure.
//!
//! # Sub-modules
//!
//! - **`scanner`** – Timed unfiltered scans reported as advertisements.
//! - **`central`** – GATT client links: connect, enumerate services, write
//!   HID reports.
//! - **`mock`**    – Scriptable fakes of both ports, for tests.
//!
//! [`probe`] runs once at startup.  A machine without an adapter gets
//! [`Capability::Unavailable`] and the rest of the application keeps working
//! over the network transport.

pub mod central;
pub mod mock;
pub mod scanner;

use std::sync::Arc;

use btleplug::api::{Manager as _, Peripheral as _, PeripheralProperties};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tracing::{info, warn};

use crate::application::ble_connection::BleCentral;
use crate::application::ble_discovery::BleScanner;
use crate::application::capability::Capability;

/// The two Bluetooth ports, each available or not.
pub struct BluetoothBackends {
    pub scanner: Capability<Arc<dyn BleScanner>>,
    pub central: Capability<Arc<dyn BleCentral>>,
}

/// Looks for the first system adapter.
pub async fn probe() -> BluetoothBackends {
    match first_adapter().await {
        Ok(adapter) => {
            info!("Bluetooth adapter found");
            BluetoothBackends {
                scanner: Capability::Available(Arc::new(scanner::BtleplugScanner::new(adapter.clone()))),
                central: Capability::Available(Arc::new(central::BtleplugCentral::new(adapter))),
            }
        }
        Err(reason) => {
            warn!("Bluetooth unavailable: {reason}");
            BluetoothBackends {
                scanner: Capability::Unavailable(reason.clone()),
                central: Capability::Unavailable(reason),
            }
        }
    }
}

async fn first_adapter() -> Result<Adapter, String> {
    let manager = Manager::new().await.map_err(|e| e.to_string())?;
    manager
        .adapters()
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .next()
        .ok_or_else(|| "no Bluetooth adapter found".to_string())
}

/// The MAC address, or the platform identifier where the MAC is hidden
/// (CoreBluetooth reports all zeros).
fn peripheral_address(peripheral: &Peripheral, props: &PeripheralProperties) -> String {
    if props.address.into_inner() == [0u8; 6] {
        peripheral.id().to_string()
    } else {
        props.address.to_string()
    }
}
