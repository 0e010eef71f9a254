use parking_lot::Mutex;
use tracing::debug;

/// Output devices wired into the node. The set is fixed at startup, so an
/// unknown device is unrepresentable rather than a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorId {
    LedLight,
    FanRelay,
    Buzzer,
}

impl ActuatorId {
    pub const ALL: [ActuatorId; 3] = [ActuatorId::LedLight, ActuatorId::FanRelay, ActuatorId::Buzzer];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorId::LedLight => "led_light",
            ActuatorId::FanRelay => "fan_relay",
            ActuatorId::Buzzer => "buzzer",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Driver for one output device. Implementations are expected to be
/// near-instantaneous and infallible; a driver that cannot come up should
/// fail at wiring time, not per call.
pub trait ActuatorDriver: Send + Sync {
    fn set(&self, on: bool);
}

struct DeviceSlot {
    driver: Box<dyn ActuatorDriver>,
    on: bool,
}

/// Exclusive owner of all actuator on/off state. Every other component reads
/// and writes through this registry, never through the drivers directly.
pub struct ActuatorRegistry {
    devices: Mutex<[DeviceSlot; 3]>,
}

impl ActuatorRegistry {
    pub fn new(
        led_light: Box<dyn ActuatorDriver>,
        fan_relay: Box<dyn ActuatorDriver>,
        buzzer: Box<dyn ActuatorDriver>,
    ) -> Self {
        Self {
            devices: Mutex::new([
                DeviceSlot { driver: led_light, on: false },
                DeviceSlot { driver: fan_relay, on: false },
                DeviceSlot { driver: buzzer, on: false },
            ]),
        }
    }

    /// Drive the device and record its new state. The driver call happens
    /// under the lock so a concurrent `snapshot` can never observe the state
    /// map ahead of or behind the hardware.
    pub fn set_state(&self, id: ActuatorId, on: bool) {
        let mut devices = self.devices.lock();
        let slot = &mut devices[id.index()];
        slot.driver.set(on);
        slot.on = on;
        debug!(device = id.as_str(), on, "actuator state changed");
    }

    pub fn get_state(&self, id: ActuatorId) -> bool {
        self.devices.lock()[id.index()].on
    }

    /// Internally consistent view of every device, taken under one lock
    /// guard. All actuator columns of a single journal record come from one
    /// such snapshot.
    pub fn snapshot(&self) -> Vec<(&'static str, bool)> {
        let devices = self.devices.lock();
        ActuatorId::ALL
            .iter()
            .map(|id| (id.as_str(), devices[id.index()].on))
            .collect()
    }

    /// Turn every device off. Used on shutdown.
    pub fn all_off(&self) {
        let mut devices = self.devices.lock();
        for slot in devices.iter_mut() {
            slot.driver.set(false);
            slot.on = false;
        }
    }
}
