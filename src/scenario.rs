use std::{fmt, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("scenario list is empty")]
    Empty,
    #[error("malformed scenario {0:?}, expected <channel>:<rate>:<power>")]
    Malformed(String),
    #[error("invalid channel: {0}")]
    BadChannel(String),
    #[error("invalid data rate: {0} (1mbps, 2mbps, 250kbps)")]
    BadRate(String),
    #[error("invalid power: {0} (-18dbm, -12dbm, -6dbm, 0dbm)")]
    BadPower(String),
}

/// Over-the-air data rate, coded the way the radio driver numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataRate {
    Mbps1,
    Mbps2,
    Kbps250,
}

impl DataRate {
    pub fn code(self) -> u8 {
        match self {
            DataRate::Mbps1 => 0,
            DataRate::Mbps2 => 1,
            DataRate::Kbps250 => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DataRate::Mbps1),
            1 => Some(DataRate::Mbps2),
            2 => Some(DataRate::Kbps250),
            _ => None,
        }
    }

    /// Divisor applied to a link's base rate to emulate this data rate.
    pub fn divisor(self) -> u32 {
        match self {
            DataRate::Mbps2 => 1,
            DataRate::Mbps1 => 2,
            DataRate::Kbps250 => 8,
        }
    }
}

impl FromStr for DataRate {
    type Err = ScenarioError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1mbps" => Ok(DataRate::Mbps1),
            "2mbps" => Ok(DataRate::Mbps2),
            "250kbps" => Ok(DataRate::Kbps250),
            _ => Err(ScenarioError::BadRate(s.into())),
        }
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataRate::Mbps1 => "1mbps",
            DataRate::Mbps2 => "2mbps",
            DataRate::Kbps250 => "250kbps",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxPower {
    Minus18Dbm,
    Minus12Dbm,
    Minus6Dbm,
    ZeroDbm,
}

impl TxPower {
    pub fn code(self) -> u8 {
        match self {
            TxPower::Minus18Dbm => 0,
            TxPower::Minus12Dbm => 1,
            TxPower::Minus6Dbm => 2,
            TxPower::ZeroDbm => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TxPower::Minus18Dbm),
            1 => Some(TxPower::Minus12Dbm),
            2 => Some(TxPower::Minus6Dbm),
            3 => Some(TxPower::ZeroDbm),
            _ => None,
        }
    }
}

impl FromStr for TxPower {
    type Err = ScenarioError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "-18dbm" => Ok(TxPower::Minus18Dbm),
            "-12dbm" => Ok(TxPower::Minus12Dbm),
            "-6dbm" => Ok(TxPower::Minus6Dbm),
            "0dbm" => Ok(TxPower::ZeroDbm),
            _ => Err(ScenarioError::BadPower(s.into())),
        }
    }
}

impl fmt::Display for TxPower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxPower::Minus18Dbm => "-18dbm",
            TxPower::Minus12Dbm => "-12dbm",
            TxPower::Minus6Dbm => "-6dbm",
            TxPower::ZeroDbm => "0dbm",
        })
    }
}

/// One point of the benchmarking sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TuningParams {
    pub channel: u8,
    pub data_rate: DataRate,
    pub power: TxPower,
}

impl TuningParams {
    pub const fn new(channel: u8, data_rate: DataRate, power: TxPower) -> Self {
        Self {
            channel,
            data_rate,
            power,
        }
    }
}

/// What a radio runs after power-on: channel 2, 2 Mbps, 0 dBm.
impl Default for TuningParams {
    fn default() -> Self {
        Self::new(2, DataRate::Mbps2, TxPower::ZeroDbm)
    }
}

impl fmt::Display for TuningParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.channel, self.data_rate, self.power)
    }
}

impl FromStr for TuningParams {
    type Err = ScenarioError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let [channel, rate, power] = parts.as_slice() else {
            return Err(ScenarioError::Malformed(s.into()));
        };
        let channel = channel
            .parse::<u8>()
            .map_err(|_| ScenarioError::BadChannel((*channel).into()))?;
        Ok(Self::new(channel, rate.parse()?, power.parse()?))
    }
}

/// The sweep the deployed fleet runs. Index 0 matches the power-on
/// configuration, so the first cycle needs no retune.
pub const DEFAULT_SCENARIOS: [TuningParams; 4] = [
    TuningParams::new(2, DataRate::Mbps2, TxPower::ZeroDbm),
    TuningParams::new(2, DataRate::Kbps250, TxPower::ZeroDbm),
    TuningParams::new(2, DataRate::Mbps2, TxPower::Minus18Dbm),
    TuningParams::new(2, DataRate::Mbps2, TxPower::ZeroDbm),
];

/// Cyclic sequence of radio configurations.
#[derive(Debug, Clone)]
pub struct Scenarios {
    list: Vec<TuningParams>,
    index: usize,
}

impl Scenarios {
    pub fn new(list: Vec<TuningParams>) -> Result<Self, ScenarioError> {
        if list.is_empty() {
            return Err(ScenarioError::Empty);
        }
        Ok(Self { list, index: 0 })
    }

    pub fn current(&self) -> TuningParams {
        self.list[self.index]
    }

    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.list.len();
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl Default for Scenarios {
    fn default() -> Self {
        Self {
            list: DEFAULT_SCENARIOS.to_vec(),
            index: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_cyclic() {
        for n in 1..=5u8 {
            let list: Vec<_> = (0..n)
                .map(|c| TuningParams::new(c, DataRate::Mbps1, TxPower::Minus6Dbm))
                .collect();
            let mut s = Scenarios::new(list).unwrap();
            s.advance();
            let start = s.current();
            for _ in 0..n {
                s.advance();
            }
            assert_eq!(s.current(), start);
        }
    }

    #[test]
    fn advance_wraps_to_zero() {
        let mut s = Scenarios::default();
        for _ in 0..s.len() - 1 {
            s.advance();
        }
        assert_eq!(s.index(), 3);
        s.advance();
        assert_eq!(s.index(), 0);
        assert_eq!(s.current(), DEFAULT_SCENARIOS[0]);
    }

    #[test]
    fn empty_list_is_rejected() {
        assert_eq!(Scenarios::new(vec![]).unwrap_err(), ScenarioError::Empty);
    }

    #[test]
    fn parse_scenario() {
        let p: TuningParams = "90:250kbps:-18dBm".parse().unwrap();
        assert_eq!(
            p,
            TuningParams::new(90, DataRate::Kbps250, TxPower::Minus18Dbm)
        );
        assert_eq!(p.to_string(), "90:250kbps:-18dbm");
    }

    #[test]
    fn parse_scenario_errors() {
        assert!(matches!(
            "2:2mbps".parse::<TuningParams>(),
            Err(ScenarioError::Malformed(_))
        ));
        assert!(matches!(
            "300:2mbps:0dbm".parse::<TuningParams>(),
            Err(ScenarioError::BadChannel(_))
        ));
        assert!(matches!(
            "2:3mbps:0dbm".parse::<TuningParams>(),
            Err(ScenarioError::BadRate(_))
        ));
        assert!(matches!(
            "2:2mbps:5dbm".parse::<TuningParams>(),
            Err(ScenarioError::BadPower(_))
        ));
    }

    #[test]
    fn codes_roundtrip() {
        for c in 0..3 {
            assert_eq!(DataRate::from_code(c).unwrap().code(), c);
        }
        for c in 0..4 {
            assert_eq!(TxPower::from_code(c).unwrap().code(), c);
        }
        assert!(DataRate::from_code(3).is_none());
        assert!(TxPower::from_code(4).is_none());
    }
}
