//! Alarm actions available to alarmd
//!
//! Actions are bound by type label, both for configured system alarms and
//! for customizable alarms restored from the store file.

use alarm_scheduler::{AlarmAction, AlarmRecord};
use tracing::{debug, info, warn};

pub const LOG: &str = "LOG";
pub const HEARTBEAT: &str = "HEARTBEAT";
pub const RELAY_ON: &str = "RELAY_ON";
pub const RELAY_OFF: &str = "RELAY_OFF";

pub const KNOWN_ACTIONS: [&str; 4] = [LOG, HEARTBEAT, RELAY_ON, RELAY_OFF];

/// Number of relay outputs; the alarm parameter selects one
pub const RELAY_CHANNELS: u16 = 8;

/// Device state handed to member actions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceContext {
    pub heartbeats: u64,
    /// Bit n set = relay n energized
    pub relays: u8,
}

impl DeviceContext {
    pub fn relay(&self, channel: u16) -> bool {
        channel < RELAY_CHANNELS && self.relays & (1 << channel) != 0
    }
}

fn heartbeat(ctx: &mut DeviceContext, parameter: u16) {
    ctx.heartbeats += 1;
    info!("Heartbeat #{} (param {})", ctx.heartbeats, parameter);
}

fn relay_on(ctx: &mut DeviceContext, channel: u16) {
    set_relay(ctx, channel, true);
}

fn relay_off(ctx: &mut DeviceContext, channel: u16) {
    set_relay(ctx, channel, false);
}

fn set_relay(ctx: &mut DeviceContext, channel: u16, on: bool) {
    if channel >= RELAY_CHANNELS {
        warn!("Relay channel {} out of range (0-{})", channel, RELAY_CHANNELS - 1);
        return;
    }
    if ctx.relay(channel) == on {
        debug!("Relay {} already {}", channel, if on { "ON" } else { "OFF" });
        return;
    }
    let bit = 1u8 << channel;
    if on {
        ctx.relays |= bit;
    } else {
        ctx.relays &= !bit;
    }
    info!(
        "Relay {} {} (outputs 0b{:08b})",
        channel,
        if on { "ON" } else { "OFF" },
        ctx.relays
    );
}

pub fn is_known(label: &str) -> bool {
    KNOWN_ACTIONS.iter().any(|k| k.eq_ignore_ascii_case(label.trim()))
}

/// Action for a type label, `None` if the label is unknown
pub fn resolve(label: &str) -> Option<AlarmAction<DeviceContext>> {
    match label.trim().to_ascii_uppercase().as_str() {
        LOG => Some(AlarmAction::external(|parameter| {
            info!("Scheduled log alarm fired (param {})", parameter);
        })),
        HEARTBEAT => Some(AlarmAction::Member(heartbeat)),
        RELAY_ON => Some(AlarmAction::Member(relay_on)),
        RELAY_OFF => Some(AlarmAction::Member(relay_off)),
        _ => None,
    }
}

/// Resolver for `AlarmStore::load_customizables`
pub fn resolve_record(record: &AlarmRecord) -> Option<AlarmAction<DeviceContext>> {
    let action = resolve(&record.action);
    if action.is_none() {
        warn!(
            "Stored alarm {} has unknown action '{}', it will not do anything",
            record.id, record.action
        );
    }
    action
}
