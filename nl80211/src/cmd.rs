/// nl80211 commands used by this daemon, from the kernel's nl80211.h.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nl80211Cmd {
    GetInterface,
    SetInterface,
    NewInterface,
    DelInterface,
    GetKey,
    SetKey,
    NewKey,
    DelKey,
    SetBeacon,
    StartAp,
    StopAp,
    GetStation,
    SetStation,
    NewStation,
    DelStation,
    Authenticate,
    Associate,
    Deauthenticate,
    Disassociate,
    Connect,
    Roam,
    Disconnect,
    RegisterFrame,
    Frame,
    FrameTxStatus,
    SetCqm,
    NotifyCqm,
    SetRekeyOffload,
    ControlPortFrame,
    Other(u8),
}

impl From<Nl80211Cmd> for u8 {
    fn from(cmd: Nl80211Cmd) -> u8 {
        match cmd {
            Nl80211Cmd::GetInterface => 5,
            Nl80211Cmd::SetInterface => 6,
            Nl80211Cmd::NewInterface => 7,
            Nl80211Cmd::DelInterface => 8,
            Nl80211Cmd::GetKey => 9,
            Nl80211Cmd::SetKey => 10,
            Nl80211Cmd::NewKey => 11,
            Nl80211Cmd::DelKey => 12,
            Nl80211Cmd::SetBeacon => 14,
            Nl80211Cmd::StartAp => 15,
            Nl80211Cmd::StopAp => 16,
            Nl80211Cmd::GetStation => 17,
            Nl80211Cmd::SetStation => 18,
            Nl80211Cmd::NewStation => 19,
            Nl80211Cmd::DelStation => 20,
            Nl80211Cmd::Authenticate => 37,
            Nl80211Cmd::Associate => 38,
            Nl80211Cmd::Deauthenticate => 39,
            Nl80211Cmd::Disassociate => 40,
            Nl80211Cmd::Connect => 46,
            Nl80211Cmd::Roam => 47,
            Nl80211Cmd::Disconnect => 48,
            Nl80211Cmd::RegisterFrame => 58,
            Nl80211Cmd::Frame => 59,
            Nl80211Cmd::FrameTxStatus => 60,
            Nl80211Cmd::SetCqm => 63,
            Nl80211Cmd::NotifyCqm => 64,
            Nl80211Cmd::SetRekeyOffload => 79,
            Nl80211Cmd::ControlPortFrame => 129,
            Nl80211Cmd::Other(cmd) => cmd,
        }
    }
}

impl From<u8> for Nl80211Cmd {
    fn from(cmd: u8) -> Nl80211Cmd {
        match cmd {
            5 => Nl80211Cmd::GetInterface,
            6 => Nl80211Cmd::SetInterface,
            7 => Nl80211Cmd::NewInterface,
            8 => Nl80211Cmd::DelInterface,
            9 => Nl80211Cmd::GetKey,
            10 => Nl80211Cmd::SetKey,
            11 => Nl80211Cmd::NewKey,
            12 => Nl80211Cmd::DelKey,
            14 => Nl80211Cmd::SetBeacon,
            15 => Nl80211Cmd::StartAp,
            16 => Nl80211Cmd::StopAp,
            17 => Nl80211Cmd::GetStation,
            18 => Nl80211Cmd::SetStation,
            19 => Nl80211Cmd::NewStation,
            20 => Nl80211Cmd::DelStation,
            37 => Nl80211Cmd::Authenticate,
            38 => Nl80211Cmd::Associate,
            39 => Nl80211Cmd::Deauthenticate,
            40 => Nl80211Cmd::Disassociate,
            46 => Nl80211Cmd::Connect,
            47 => Nl80211Cmd::Roam,
            48 => Nl80211Cmd::Disconnect,
            58 => Nl80211Cmd::RegisterFrame,
            59 => Nl80211Cmd::Frame,
            60 => Nl80211Cmd::FrameTxStatus,
            63 => Nl80211Cmd::SetCqm,
            64 => Nl80211Cmd::NotifyCqm,
            79 => Nl80211Cmd::SetRekeyOffload,
            129 => Nl80211Cmd::ControlPortFrame,
            other => Nl80211Cmd::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        for value in 0u8..=255 {
            let cmd = Nl80211Cmd::from(value);
            assert_eq!(u8::from(cmd), value);
        }
    }
}
