use serde::Deserialize;
use serde_json::Value;

/// Lending-protocol action named in a transaction record.
///
/// Unrecognised action strings are carried through as `Other` rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Deposit,
    Borrow,
    Repay,
    RedeemUnderlying,
    LiquidationCall,
    Other(String),
}

impl Action {
    /// Known actions, in column order.
    pub const KNOWN: [Self; 5] = [
        Self::Deposit,
        Self::Borrow,
        Self::Repay,
        Self::RedeemUnderlying,
        Self::LiquidationCall,
    ];

    pub fn parse(s: &str) -> Self {
        match s {
            "deposit" => Self::Deposit,
            "borrow" => Self::Borrow,
            "repay" => Self::Repay,
            "redeemunderlying" => Self::RedeemUnderlying,
            "liquidationcall" => Self::LiquidationCall,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Deposit => "deposit",
            Self::Borrow => "borrow",
            Self::Repay => "repay",
            Self::RedeemUnderlying => "redeemunderlying",
            Self::LiquidationCall => "liquidationcall",
            Self::Other(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// Transaction event as it appears in the input JSON.
///
/// Every field is optional here; required-field checks happen during ingestion
/// so errors can name the offending record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTransaction {
    #[serde(rename = "userWallet")]
    pub user_wallet: Option<String>,
    /// Epoch seconds, as an integer or an integer string.
    pub timestamp: Option<Value>,
    pub action: Option<String>,
    #[serde(rename = "actionData")]
    pub action_data: Option<RawActionData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawActionData {
    /// Base-unit amount, as a number or a numeric string.
    pub amount: Option<Value>,
    #[serde(rename = "assetSymbol")]
    pub asset_symbol: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse_known_and_other() {
        assert_eq!(Action::parse("deposit"), Action::Deposit);
        assert_eq!(Action::parse("liquidationcall"), Action::LiquidationCall);
        assert_eq!(
            Action::parse("flashloan"),
            Action::Other("flashloan".to_string())
        );
        // Matching is exact; the source data is lowercase.
        assert_eq!(Action::parse("Borrow"), Action::Other("Borrow".to_string()));
    }

    #[test]
    fn test_action_as_str_round_trips_known() {
        for action in Action::KNOWN {
            assert!(action.is_known());
            assert_eq!(Action::parse(action.as_str()), action);
        }
        assert!(!Action::Other("swap".to_string()).is_known());
    }

    #[test]
    fn test_raw_transaction_deserializes_aave_record() {
        let json = r#"{
            "userWallet": "0x00000000001accfa9cef68cf5371a23025b6d4b6",
            "network": "polygon",
            "protocol": "aave_v2",
            "txHash": "0x695c69acf608fbf5d38e48ca5535e118cc213a89e3d6d2e66e6b0e3b2e8d4190",
            "timestamp": 1629178166,
            "action": "deposit",
            "actionData": {
                "type": "Deposit",
                "amount": "2000000000",
                "assetSymbol": "USDC",
                "assetPriceUSD": "0.9938318274296357543568636362026045"
            }
        }"#;
        let raw: RawTransaction = serde_json::from_str(json).unwrap();
        assert_eq!(
            raw.user_wallet.as_deref(),
            Some("0x00000000001accfa9cef68cf5371a23025b6d4b6")
        );
        assert_eq!(raw.timestamp, Some(Value::from(1_629_178_166_i64)));
        assert_eq!(raw.action.as_deref(), Some("deposit"));
        let data = raw.action_data.unwrap();
        assert_eq!(data.amount, Some(Value::from("2000000000")));
        assert_eq!(data.asset_symbol.as_deref(), Some("USDC"));
    }

    #[test]
    fn test_raw_transaction_missing_action_data() {
        let raw: RawTransaction =
            serde_json::from_str(r#"{"userWallet": "0xa", "timestamp": 1, "action": "repay"}"#)
                .unwrap();
        assert!(raw.action_data.is_none());
    }
}
