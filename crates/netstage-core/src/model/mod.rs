pub mod change;
pub mod payload;
pub mod resource;
pub mod snapshot;

pub use change::{
    ChangeAction, ChangeStatus, ChangeType, NewChange, PendingChange, DEFAULT_PRIORITY,
};
pub use payload::{
    AddressMethod, BridgeConfig, ChangeConfig, DnsConfig, FirewallRule, InterfaceConfig,
    RouteConfig,
};
pub use resource::{BridgeStatus, PersistentBridge, PersistentInterface};
pub use snapshot::{InterfaceState, NetworkSnapshot, NetworkState, SnapshotStatus};
