//! Command identifiers.
//!
//! Every frame carries a one-byte command identifier. The MAC command space
//! is laid out as bit fields:
//!
//! ```text
//! ┌─────────┬─────────┬─────────┬───────────────────┐
//! │ bit 7   │ bit 6   │ bit 5   │ bits 4..0         │
//! │ INVALID │ SYN     │ S2M     │ message id (MID)  │
//! └─────────┴─────────┴─────────┴───────────────────┘
//! ```
//!
//! `S2M` marks the uplink (confirms and indications sent by the radio),
//! `SYN` marks synchronous messages. A synchronous request is answered by
//! exactly one confirm, found through [`CommandId::sync_response`].
//!
//! The EVBME host-interface commands live outside that layout and are
//! paired explicitly.

use std::fmt;

/// Bit masks for the MAC command space.
pub mod masks {
    /// Mask to derive the message id from a command id.
    pub const MID_MASK: u8 = 0x1F;
    /// Confirm or indication travelling from the radio to the host.
    pub const S2M: u8 = 0x20;
    /// Synchronous message.
    pub const SYN: u8 = 0x40;
    /// Idle or otherwise invalid command id.
    pub const INVALID: u8 = 0x80;
}

/// A one-byte command identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u8);

impl CommandId {
    // Control bytes
    pub const IDLE: Self = Self(0xFF);
    pub const NACK: Self = Self(0xF0);

    // MCPS
    pub const MCPS_DATA_REQUEST: Self = Self(0x00);
    pub const MCPS_PURGE_REQUEST: Self = Self(0x41);
    pub const MCPS_DATA_INDICATION: Self = Self(0x20);
    pub const MCPS_DATA_CONFIRM: Self = Self(0x21);
    pub const MCPS_PURGE_CONFIRM: Self = Self(0x62);

    // PCPS
    pub const PCPS_DATA_REQUEST: Self = Self(0x07);
    pub const PCPS_DATA_CONFIRM: Self = Self(0x38);
    pub const PCPS_DATA_INDICATION: Self = Self(0x28);

    // MLME requests
    pub const MLME_ASSOCIATE_REQUEST: Self = Self(0x02);
    pub const MLME_ASSOCIATE_RESPONSE: Self = Self(0x03);
    pub const MLME_DISASSOCIATE_REQUEST: Self = Self(0x04);
    pub const MLME_GET_REQUEST: Self = Self(0x45);
    pub const MLME_ORPHAN_RESPONSE: Self = Self(0x06);
    pub const MLME_RESET_REQUEST: Self = Self(0x47);
    pub const MLME_RX_ENABLE_REQUEST: Self = Self(0x48);
    pub const MLME_SCAN_REQUEST: Self = Self(0x09);
    pub const MLME_SET_REQUEST: Self = Self(0x4A);
    pub const MLME_START_REQUEST: Self = Self(0x4B);
    pub const MLME_SYNC_REQUEST: Self = Self(0x0C);
    pub const MLME_POLL_REQUEST: Self = Self(0x32);

    // MLME confirms and indications
    pub const MLME_IE_NOTIFY_INDICATION: Self = Self(0x22);
    pub const MLME_ASSOCIATE_INDICATION: Self = Self(0x23);
    pub const MLME_ASSOCIATE_CONFIRM: Self = Self(0x24);
    pub const MLME_DISASSOCIATE_INDICATION: Self = Self(0x25);
    pub const MLME_DISASSOCIATE_CONFIRM: Self = Self(0x26);
    pub const MLME_BEACON_NOTIFY_INDICATION: Self = Self(0x27);
    pub const MLME_GET_CONFIRM: Self = Self(0x68);
    pub const MLME_ORPHAN_INDICATION: Self = Self(0x29);
    pub const MLME_RESET_CONFIRM: Self = Self(0x6A);
    pub const MLME_RX_ENABLE_CONFIRM: Self = Self(0x6B);
    pub const MLME_SCAN_CONFIRM: Self = Self(0x2C);
    pub const MLME_COMM_STATUS_INDICATION: Self = Self(0x2D);
    pub const MLME_SET_CONFIRM: Self = Self(0x6E);
    pub const MLME_START_CONFIRM: Self = Self(0x6F);
    pub const MLME_SYNC_LOSS_INDICATION: Self = Self(0x30);
    pub const MLME_POLL_INDICATION: Self = Self(0x31);
    pub const MLME_POLL_CONFIRM: Self = Self(0x33);

    // HWME
    pub const HWME_SET_REQUEST: Self = Self(0x4E);
    pub const HWME_GET_REQUEST: Self = Self(0x4F);
    pub const HWME_HAES_REQUEST: Self = Self(0x50);
    pub const HWME_SET_CONFIRM: Self = Self(0x72);
    pub const HWME_GET_CONFIRM: Self = Self(0x73);
    pub const HWME_HAES_CONFIRM: Self = Self(0x74);
    pub const HWME_WAKEUP_INDICATION: Self = Self(0x35);

    // TDME
    pub const TDME_SETSFR_REQUEST: Self = Self(0x51);
    pub const TDME_GETSFR_REQUEST: Self = Self(0x52);
    pub const TDME_TESTMODE_REQUEST: Self = Self(0x53);
    pub const TDME_SET_REQUEST: Self = Self(0x54);
    pub const TDME_TXPKT_REQUEST: Self = Self(0x55);
    pub const TDME_LOTLK_REQUEST: Self = Self(0x56);
    pub const TDME_SETSFR_CONFIRM: Self = Self(0x77);
    pub const TDME_GETSFR_CONFIRM: Self = Self(0x78);
    pub const TDME_TESTMODE_CONFIRM: Self = Self(0x79);
    pub const TDME_SET_CONFIRM: Self = Self(0x7A);
    pub const TDME_TXPKT_CONFIRM: Self = Self(0x7B);
    pub const TDME_RXPKT_INDICATION: Self = Self(0x3C);
    pub const TDME_EDDET_INDICATION: Self = Self(0x3D);
    pub const TDME_ERROR_INDICATION: Self = Self(0x3E);
    pub const TDME_LOTLK_CONFIRM: Self = Self(0x7F);

    // EVBME host interface
    pub const EVBME_GET_CONFIRM: Self = Self(0x5C);
    pub const EVBME_GET_REQUEST: Self = Self(0x5D);
    pub const EVBME_SET_CONFIRM: Self = Self(0x5E);
    pub const EVBME_SET_REQUEST: Self = Self(0x5F);
    pub const EVBME_GUI_CONNECTED: Self = Self(0x81);
    pub const EVBME_GUI_DISCONNECTED: Self = Self(0x82);
    pub const EVBME_MESSAGE_INDICATION: Self = Self(0xA0);
    pub const EVBME_COMM_CHECK: Self = Self(0xA1);
    pub const EVBME_COMM_INDICATION: Self = Self(0xA2);
    pub const EVBME_DFU_CMD: Self = Self(0xA3);
    pub const EVBME_RXRDY: Self = Self(0xAA);
    pub const EVBME_RXFAIL: Self = Self(0xAB);

    /// Create a command id from its raw byte.
    #[inline]
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Raw byte value.
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Message id (low five bits).
    #[inline]
    pub const fn message_id(self) -> u8 {
        self.0 & masks::MID_MASK
    }

    /// True if the id lies inside the MAC command space (INVALID bit clear).
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 & masks::INVALID == 0
    }

    /// True for confirms and indications sent by the radio.
    #[inline]
    pub const fn is_uplink(self) -> bool {
        self.is_valid() && self.0 & masks::S2M != 0
    }

    /// True for requests and responses sent by the host.
    #[inline]
    pub const fn is_downlink(self) -> bool {
        self.is_valid() && self.0 & masks::S2M == 0
    }

    /// True for synchronous messages.
    #[inline]
    pub const fn is_sync(self) -> bool {
        self.is_valid() && self.0 & masks::SYN != 0
    }

    /// The confirm that answers this request synchronously, if any.
    ///
    /// ```
    /// use ca821x_link::protocol::CommandId;
    ///
    /// assert_eq!(
    ///     CommandId::MLME_GET_REQUEST.sync_response(),
    ///     Some(CommandId::MLME_GET_CONFIRM)
    /// );
    /// assert_eq!(CommandId::MCPS_DATA_REQUEST.sync_response(), None);
    /// ```
    pub fn sync_response(self) -> Option<CommandId> {
        match self {
            Self::EVBME_GET_REQUEST => return Some(Self::EVBME_GET_CONFIRM),
            Self::EVBME_SET_REQUEST => return Some(Self::EVBME_SET_CONFIRM),
            _ => {}
        }

        if !self.is_sync() || self.is_uplink() {
            return None;
        }

        SYNC_PAIRINGS
            .get(self.message_id() as usize)
            .copied()
            .filter(|&id| id != Self::IDLE)
    }

    /// Symbolic name, if this is a known command.
    pub fn name(self) -> Option<&'static str> {
        KNOWN_COMMANDS
            .iter()
            .find(|(id, _)| *id == self)
            .map(|(_, name)| *name)
    }
}

/// Synchronous confirm for each request message id. IDLE marks an
/// asynchronous slot.
const SYNC_PAIRINGS: [CommandId; 23] = [
    CommandId::IDLE,
    CommandId::MCPS_PURGE_CONFIRM,
    CommandId::IDLE,
    CommandId::IDLE,
    CommandId::IDLE,
    CommandId::MLME_GET_CONFIRM,
    CommandId::IDLE,
    CommandId::MLME_RESET_CONFIRM,
    CommandId::MLME_RX_ENABLE_CONFIRM,
    CommandId::IDLE,
    CommandId::MLME_SET_CONFIRM,
    CommandId::MLME_START_CONFIRM,
    CommandId::IDLE,
    CommandId::IDLE,
    CommandId::HWME_SET_CONFIRM,
    CommandId::HWME_GET_CONFIRM,
    CommandId::HWME_HAES_CONFIRM,
    CommandId::TDME_SETSFR_CONFIRM,
    CommandId::TDME_GETSFR_CONFIRM,
    CommandId::TDME_TESTMODE_CONFIRM,
    CommandId::TDME_SET_CONFIRM,
    CommandId::TDME_TXPKT_CONFIRM,
    CommandId::TDME_LOTLK_CONFIRM,
];

const KNOWN_COMMANDS: &[(CommandId, &str)] = &[
    (CommandId::IDLE, "IDLE"),
    (CommandId::NACK, "NACK"),
    (CommandId::MCPS_DATA_REQUEST, "MCPS-DATA.request"),
    (CommandId::MCPS_PURGE_REQUEST, "MCPS-PURGE.request"),
    (CommandId::MCPS_DATA_INDICATION, "MCPS-DATA.indication"),
    (CommandId::MCPS_DATA_CONFIRM, "MCPS-DATA.confirm"),
    (CommandId::MCPS_PURGE_CONFIRM, "MCPS-PURGE.confirm"),
    (CommandId::PCPS_DATA_REQUEST, "PCPS-DATA.request"),
    (CommandId::PCPS_DATA_CONFIRM, "PCPS-DATA.confirm"),
    (CommandId::PCPS_DATA_INDICATION, "PCPS-DATA.indication"),
    (CommandId::MLME_ASSOCIATE_REQUEST, "MLME-ASSOCIATE.request"),
    (CommandId::MLME_ASSOCIATE_RESPONSE, "MLME-ASSOCIATE.response"),
    (CommandId::MLME_DISASSOCIATE_REQUEST, "MLME-DISASSOCIATE.request"),
    (CommandId::MLME_GET_REQUEST, "MLME-GET.request"),
    (CommandId::MLME_ORPHAN_RESPONSE, "MLME-ORPHAN.response"),
    (CommandId::MLME_RESET_REQUEST, "MLME-RESET.request"),
    (CommandId::MLME_RX_ENABLE_REQUEST, "MLME-RX-ENABLE.request"),
    (CommandId::MLME_SCAN_REQUEST, "MLME-SCAN.request"),
    (CommandId::MLME_SET_REQUEST, "MLME-SET.request"),
    (CommandId::MLME_START_REQUEST, "MLME-START.request"),
    (CommandId::MLME_SYNC_REQUEST, "MLME-SYNC.request"),
    (CommandId::MLME_POLL_REQUEST, "MLME-POLL.request"),
    (CommandId::MLME_IE_NOTIFY_INDICATION, "MLME-IE-NOTIFY.indication"),
    (CommandId::MLME_ASSOCIATE_INDICATION, "MLME-ASSOCIATE.indication"),
    (CommandId::MLME_ASSOCIATE_CONFIRM, "MLME-ASSOCIATE.confirm"),
    (CommandId::MLME_DISASSOCIATE_INDICATION, "MLME-DISASSOCIATE.indication"),
    (CommandId::MLME_DISASSOCIATE_CONFIRM, "MLME-DISASSOCIATE.confirm"),
    (CommandId::MLME_BEACON_NOTIFY_INDICATION, "MLME-BEACON-NOTIFY.indication"),
    (CommandId::MLME_GET_CONFIRM, "MLME-GET.confirm"),
    (CommandId::MLME_ORPHAN_INDICATION, "MLME-ORPHAN.indication"),
    (CommandId::MLME_RESET_CONFIRM, "MLME-RESET.confirm"),
    (CommandId::MLME_RX_ENABLE_CONFIRM, "MLME-RX-ENABLE.confirm"),
    (CommandId::MLME_SCAN_CONFIRM, "MLME-SCAN.confirm"),
    (CommandId::MLME_COMM_STATUS_INDICATION, "MLME-COMM-STATUS.indication"),
    (CommandId::MLME_SET_CONFIRM, "MLME-SET.confirm"),
    (CommandId::MLME_START_CONFIRM, "MLME-START.confirm"),
    (CommandId::MLME_SYNC_LOSS_INDICATION, "MLME-SYNC-LOSS.indication"),
    (CommandId::MLME_POLL_INDICATION, "MLME-POLL.indication"),
    (CommandId::MLME_POLL_CONFIRM, "MLME-POLL.confirm"),
    (CommandId::HWME_SET_REQUEST, "HWME-SET.request"),
    (CommandId::HWME_GET_REQUEST, "HWME-GET.request"),
    (CommandId::HWME_HAES_REQUEST, "HWME-HAES.request"),
    (CommandId::HWME_SET_CONFIRM, "HWME-SET.confirm"),
    (CommandId::HWME_GET_CONFIRM, "HWME-GET.confirm"),
    (CommandId::HWME_HAES_CONFIRM, "HWME-HAES.confirm"),
    (CommandId::HWME_WAKEUP_INDICATION, "HWME-WAKEUP.indication"),
    (CommandId::TDME_SETSFR_REQUEST, "TDME-SETSFR.request"),
    (CommandId::TDME_GETSFR_REQUEST, "TDME-GETSFR.request"),
    (CommandId::TDME_TESTMODE_REQUEST, "TDME-TESTMODE.request"),
    (CommandId::TDME_SET_REQUEST, "TDME-SET.request"),
    (CommandId::TDME_TXPKT_REQUEST, "TDME-TXPKT.request"),
    (CommandId::TDME_LOTLK_REQUEST, "TDME-LOTLK.request"),
    (CommandId::TDME_SETSFR_CONFIRM, "TDME-SETSFR.confirm"),
    (CommandId::TDME_GETSFR_CONFIRM, "TDME-GETSFR.confirm"),
    (CommandId::TDME_TESTMODE_CONFIRM, "TDME-TESTMODE.confirm"),
    (CommandId::TDME_SET_CONFIRM, "TDME-SET.confirm"),
    (CommandId::TDME_TXPKT_CONFIRM, "TDME-TXPKT.confirm"),
    (CommandId::TDME_RXPKT_INDICATION, "TDME-RXPKT.indication"),
    (CommandId::TDME_EDDET_INDICATION, "TDME-EDDET.indication"),
    (CommandId::TDME_ERROR_INDICATION, "TDME-ERROR.indication"),
    (CommandId::TDME_LOTLK_CONFIRM, "TDME-LOTLK.confirm"),
    (CommandId::EVBME_GET_CONFIRM, "EVBME-GET.confirm"),
    (CommandId::EVBME_GET_REQUEST, "EVBME-GET.request"),
    (CommandId::EVBME_SET_CONFIRM, "EVBME-SET.confirm"),
    (CommandId::EVBME_SET_REQUEST, "EVBME-SET.request"),
    (CommandId::EVBME_GUI_CONNECTED, "EVBME-GUI-CONNECTED"),
    (CommandId::EVBME_GUI_DISCONNECTED, "EVBME-GUI-DISCONNECTED"),
    (CommandId::EVBME_MESSAGE_INDICATION, "EVBME-MESSAGE.indication"),
    (CommandId::EVBME_COMM_CHECK, "EVBME-COMM-CHECK"),
    (CommandId::EVBME_COMM_INDICATION, "EVBME-COMM.indication"),
    (CommandId::EVBME_DFU_CMD, "EVBME-DFU"),
    (CommandId::EVBME_RXRDY, "EVBME-RXRDY"),
    (CommandId::EVBME_RXFAIL, "EVBME-RXFAIL"),
];

impl From<u8> for CommandId {
    #[inline]
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl From<CommandId> for u8 {
    #[inline]
    fn from(id: CommandId) -> Self {
        id.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:02X})", name, self.0),
            None => write!(f, "0x{:02X}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_bits() {
        assert!(CommandId::MCPS_DATA_REQUEST.is_downlink());
        assert!(!CommandId::MCPS_DATA_REQUEST.is_uplink());
        assert!(CommandId::MCPS_DATA_INDICATION.is_uplink());
        assert!(CommandId::MLME_GET_CONFIRM.is_uplink());
        assert!(CommandId::MLME_GET_CONFIRM.is_sync());
        assert!(!CommandId::MCPS_DATA_CONFIRM.is_sync());
    }

    #[test]
    fn test_idle_and_nack_are_invalid() {
        assert!(!CommandId::IDLE.is_valid());
        assert!(!CommandId::NACK.is_valid());
        assert!(!CommandId::IDLE.is_uplink());
        assert!(!CommandId::IDLE.is_downlink());
    }

    #[test]
    fn test_every_sync_request_pairs_with_sync_confirm() {
        let requests = [
            (CommandId::MCPS_PURGE_REQUEST, CommandId::MCPS_PURGE_CONFIRM),
            (CommandId::MLME_GET_REQUEST, CommandId::MLME_GET_CONFIRM),
            (CommandId::MLME_RESET_REQUEST, CommandId::MLME_RESET_CONFIRM),
            (CommandId::MLME_RX_ENABLE_REQUEST, CommandId::MLME_RX_ENABLE_CONFIRM),
            (CommandId::MLME_SET_REQUEST, CommandId::MLME_SET_CONFIRM),
            (CommandId::MLME_START_REQUEST, CommandId::MLME_START_CONFIRM),
            (CommandId::HWME_SET_REQUEST, CommandId::HWME_SET_CONFIRM),
            (CommandId::HWME_GET_REQUEST, CommandId::HWME_GET_CONFIRM),
            (CommandId::HWME_HAES_REQUEST, CommandId::HWME_HAES_CONFIRM),
            (CommandId::TDME_SETSFR_REQUEST, CommandId::TDME_SETSFR_CONFIRM),
            (CommandId::TDME_GETSFR_REQUEST, CommandId::TDME_GETSFR_CONFIRM),
            (CommandId::TDME_TESTMODE_REQUEST, CommandId::TDME_TESTMODE_CONFIRM),
            (CommandId::TDME_SET_REQUEST, CommandId::TDME_SET_CONFIRM),
            (CommandId::TDME_TXPKT_REQUEST, CommandId::TDME_TXPKT_CONFIRM),
            (CommandId::TDME_LOTLK_REQUEST, CommandId::TDME_LOTLK_CONFIRM),
        ];

        for (request, confirm) in requests {
            assert!(request.is_sync(), "{} should be sync", request);
            assert_eq!(request.sync_response(), Some(confirm));
            assert!(confirm.is_uplink() && confirm.is_sync());
            // Request and confirm share the message id
            assert_eq!(request.message_id() & 0x1F, request.message_id());
        }
    }

    #[test]
    fn test_async_requests_have_no_sync_response() {
        assert_eq!(CommandId::MCPS_DATA_REQUEST.sync_response(), None);
        assert_eq!(CommandId::MLME_SCAN_REQUEST.sync_response(), None);
        assert_eq!(CommandId::MLME_POLL_REQUEST.sync_response(), None);
        assert_eq!(CommandId::MLME_GET_CONFIRM.sync_response(), None);
        assert_eq!(CommandId::IDLE.sync_response(), None);
    }

    #[test]
    fn test_evbme_pairings() {
        assert_eq!(
            CommandId::EVBME_GET_REQUEST.sync_response(),
            Some(CommandId::EVBME_GET_CONFIRM)
        );
        assert_eq!(
            CommandId::EVBME_SET_REQUEST.sync_response(),
            Some(CommandId::EVBME_SET_CONFIRM)
        );
        assert_eq!(CommandId::EVBME_COMM_CHECK.sync_response(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            CommandId::MLME_SET_REQUEST.to_string(),
            "MLME-SET.request (0x4A)"
        );
        assert_eq!(CommandId(0x1F).to_string(), "0x1F");
    }

    #[test]
    fn test_conversions() {
        let id: CommandId = 0x45.into();
        assert_eq!(id, CommandId::MLME_GET_REQUEST);
        assert_eq!(u8::from(id), 0x45);
        assert_eq!(id.raw(), 0x45);
        assert_eq!(id.message_id(), 0x05);
    }
}
