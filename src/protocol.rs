//! Protocol hashes and the field policy that depends on them
//!
//! The node reports the protocol that will validate the next block
//! (`next_protocol` in the head metadata). Operations prepared for Babylon
//! and later generations differ from the older ones:
//! - a transaction may not use an originated contract (`KT1...`) as source
//! - origination no longer carries `manager_pubkey`, `spendable`, `delegatable`
//! - simulation (`run_operation`) expects the chain id (Carthage onwards)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Known protocol hashes, plus a catch-all for anything newer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Protocol {
    /// 003 Proto (legacy)
    PsddFKi3,
    /// 004 Athens
    Pt24m4xi,
    /// 005 Babylon
    PsBabyM1,
    /// 006 Carthage
    PsCARTHA,
    /// 007 Delphi
    PsDELPH1,
    /// 008 Edo
    PtEdo2Zk,
    /// Any hash not listed above
    Other(String),
}

const PSDDFKI3: &str = "PsddFKi32cMJ2qPjf43Qv5GDWLDPZb3T3bF6fLKiF5HtvHNU7aP";
const PT24M4XI: &str = "Pt24m4xiPbLDhVgVfABUjirbmda3yohdN82Sp1FeuHWyUnSdzW7";
const PSBABYM1: &str = "PsBabyM1eUXZseaJdmXFApDSBqj8YBfwELoxZHHW77EMcAbbwAS";
const PSCARTHA: &str = "PsCARTHAGazKbHtnKfLzQg3kms52kSRpgnDY982a9oYsSXRLQEb";
const PSDELPH1: &str = "PsDELPH1Kxsxt8f9eWbxQeRxkjfbxoqM52jvs5Y5fBxWWh4ifpo";
const PTEDO2ZK: &str = "PtEdo2ZkT9oKpimTah6x2embF25oss54njMuPzkJTEi5RqfdZFA";

impl Protocol {
    /// Full base58 protocol hash
    pub fn hash(&self) -> &str {
        match self {
            Protocol::PsddFKi3 => PSDDFKI3,
            Protocol::Pt24m4xi => PT24M4XI,
            Protocol::PsBabyM1 => PSBABYM1,
            Protocol::PsCARTHA => PSCARTHA,
            Protocol::PsDELPH1 => PSDELPH1,
            Protocol::PtEdo2Zk => PTEDO2ZK,
            Protocol::Other(hash) => hash,
        }
    }

    pub fn from_hash(hash: &str) -> Self {
        match hash {
            PSDDFKI3 => Protocol::PsddFKi3,
            PT24M4XI => Protocol::Pt24m4xi,
            PSBABYM1 => Protocol::PsBabyM1,
            PSCARTHA => Protocol::PsCARTHA,
            PSDELPH1 => Protocol::PsDELPH1,
            PTEDO2ZK => Protocol::PtEdo2Zk,
            other => Protocol::Other(other.to_string()),
        }
    }

    /// Pre-Babylon protocols are the only known legacy generation; every
    /// other hash, including unknown future ones, follows the newer rules.
    pub fn is_babylon_or_later(&self) -> bool {
        !matches!(self, Protocol::PsddFKi3 | Protocol::Pt24m4xi)
    }

    /// Whether `run_operation` must be called with the chain id attached
    pub fn simulation_requires_chain_id(&self) -> bool {
        !matches!(
            self,
            Protocol::PsddFKi3 | Protocol::Pt24m4xi | Protocol::PsBabyM1
        )
    }
}

impl From<String> for Protocol {
    fn from(hash: String) -> Self {
        Protocol::from_hash(&hash)
    }
}

impl From<Protocol> for String {
    fn from(protocol: Protocol) -> Self {
        protocol.hash().to_string()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_hashes_round_trip() {
        for p in [
            Protocol::PsddFKi3,
            Protocol::Pt24m4xi,
            Protocol::PsBabyM1,
            Protocol::PsCARTHA,
            Protocol::PsDELPH1,
            Protocol::PtEdo2Zk,
        ] {
            assert_eq!(Protocol::from_hash(p.hash()), p);
        }
    }

    #[test]
    fn test_generation_policy() {
        assert!(!Protocol::Pt24m4xi.is_babylon_or_later());
        assert!(Protocol::PsBabyM1.is_babylon_or_later());
        assert!(Protocol::from_hash("PtNewFutureProto").is_babylon_or_later());

        assert!(!Protocol::PsBabyM1.simulation_requires_chain_id());
        assert!(Protocol::PsCARTHA.simulation_requires_chain_id());
    }

    #[test]
    fn test_serde_as_plain_string() {
        let json = serde_json::to_string(&Protocol::PsCARTHA).unwrap();
        assert_eq!(json, format!("\"{}\"", PSCARTHA));
        let back: Protocol = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Protocol::PsCARTHA);
    }
}
