//! 基础类型：MAC 地址、信道宽度、前导码

use crate::ProtocolError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use std::str::FromStr;

/// 48 位 MAC 地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const LEN: usize = 6;

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// 从属性 payload 解析（必须恰好 6 字节）
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let arr: [u8; 6] = bytes.try_into().map_err(|_| ProtocolError::InvalidLength {
            field: "mac address",
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

/// 解析 `0a:83:a1:15:bf:50`（也接受 `-` 分隔）
impl FromStr for MacAddr {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidValue {
            field: "mac".to_string(),
            value: s.to_string(),
        };

        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != Self::LEN {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(invalid());
            }
            let mut byte = [0u8; 1];
            hex::decode_to_slice(part, &mut byte).map_err(|_| invalid())?;
            *slot = byte[0];
        }
        Ok(Self(bytes))
    }
}

/// 信道宽度（`enum nl80211_chan_width`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum ChannelWidth {
    /// 20 MHz 非 HT
    Nl20NoHt = 0,
    W20 = 1,
    W40 = 2,
    W80 = 3,
    W80P80 = 4,
    W160 = 5,
    W5 = 6,
    W10 = 7,
}

impl Default for ChannelWidth {
    fn default() -> Self {
        Self::W20
    }
}

impl ChannelWidth {
    /// 配置文件中使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nl20NoHt => "20_noht",
            Self::W20 => "20",
            Self::W40 => "40",
            Self::W80 => "80",
            Self::W80P80 => "80p80",
            Self::W160 => "160",
            Self::W5 => "5",
            Self::W10 => "10",
        }
    }
}

impl fmt::Display for ChannelWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelWidth {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "20_noht" | "20noht" => Ok(Self::Nl20NoHt),
            "20" => Ok(Self::W20),
            "40" => Ok(Self::W40),
            "80" => Ok(Self::W80),
            "80p80" | "80+80" => Ok(Self::W80P80),
            "160" => Ok(Self::W160),
            "5" => Ok(Self::W5),
            "10" => Ok(Self::W10),
            _ => Err(ProtocolError::InvalidValue {
                field: "chan_width".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// 前导码类型（`enum nl80211_preamble`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum Preamble {
    Legacy = 0,
    Ht = 1,
    Vht = 2,
    Dmg = 3,
}

impl Default for Preamble {
    fn default() -> Self {
        Self::Legacy
    }
}

impl Preamble {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Ht => "ht",
            Self::Vht => "vht",
            Self::Dmg => "dmg",
        }
    }
}

impl fmt::Display for Preamble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preamble {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "ht" => Ok(Self::Ht),
            "vht" => Ok(Self::Vht),
            "dmg" => Ok(Self::Dmg),
            _ => Err(ProtocolError::InvalidValue {
                field: "preamble".to_string(),
                value: s.to_string(),
            }),
        }
    }
}
