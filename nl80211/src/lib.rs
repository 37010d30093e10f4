//! nl80211 generic-netlink transport and the route-netlink side channel.

#![deny(warnings)]
#![allow(non_local_definitions)]

mod attr;
mod cmd;
mod conn;
mod message;
pub mod rtnl;

pub use attr::{CqmAttr, Nl80211Attr, RekeyAttr, StationFlagUpdate};
pub use cmd::Nl80211Cmd;
pub use conn::{new_connection, CmdResult, CommandId, Handle, Nl80211Event};
pub use message::Nl80211Message;

// nl80211_iftype
pub const IFTYPE_STATION: u32 = 2;
pub const IFTYPE_AP: u32 = 3;

// nl80211_auth_type
pub const AUTH_TYPE_OPEN_SYSTEM: u32 = 0;
pub const AUTH_TYPE_SHARED_KEY: u32 = 1;
pub const AUTH_TYPE_FT: u32 = 2;

// NL80211_WPA_VERSION_*
pub const WPA_VERSION_2: u32 = 2;

// nl80211_mfp
pub const MFP_NO: u32 = 0;
pub const MFP_REQUIRED: u32 = 1;
pub const MFP_OPTIONAL: u32 = 2;

// nl80211_key_type
pub const KEYTYPE_GROUP: u32 = 0;
pub const KEYTYPE_PAIRWISE: u32 = 1;

// nl80211_sta_flags, used in the STA_FLAGS2 mask/set pair
pub const STA_FLAG_AUTHORIZED: u32 = 1 << 1;
pub const STA_FLAG_WME: u32 = 1 << 3;
pub const STA_FLAG_MFP: u32 = 1 << 4;
pub const STA_FLAG_AUTHENTICATED: u32 = 1 << 5;
pub const STA_FLAG_ASSOCIATED: u32 = 1 << 7;
