//! ABI source parsing.
use alloy::json_abi::JsonAbi;
use serde::Deserialize;

/// Compiler output (hardhat/foundry artifact) wrapping the ABI array.
#[derive(Deserialize)]
struct CompilerOutput {
    abi: JsonAbi,
}

/// Parse an ABI document.
///
/// Accepts a compiler artifact with an `abi` field first, then a bare ABI array.
pub fn parse_abi(source: &str) -> Result<JsonAbi, serde_json::Error> {
    if let Ok(output) = serde_json::from_str::<CompilerOutput>(source) {
        return Ok(output.abi);
    }
    serde_json::from_str::<JsonAbi>(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BARE: &str = r#"[
        {"type": "event", "name": "ProjectStatusChanged", "anonymous": false, "inputs": [
            {"name": "projectId", "type": "uint256", "indexed": true},
            {"name": "status", "type": "uint8", "indexed": false}
        ]}
    ]"#;

    #[test]
    fn parses_bare_array() {
        let abi = parse_abi(BARE).unwrap();
        assert_eq!(abi.events().count(), 1);
    }

    #[test]
    fn parses_compiler_output() {
        let abi = parse_abi(include_str!("../../../abi/Crowdfunding.json")).unwrap();
        let mut names: Vec<_> = abi.events().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(
            names,
            ["ContributionMade", "ProjectCreated", "ProjectStatusChanged", "RefundProcessed"]
        );
        assert_eq!(abi.functions().count(), 1);
    }

    #[test]
    fn wrapper_and_bare_forms_agree() {
        let wrapped = format!(r#"{{"contractName": "X", "abi": {BARE}}}"#);
        assert_eq!(parse_abi(&wrapped).unwrap(), parse_abi(BARE).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_abi("not json").is_err());
        assert!(parse_abi(r#"{"bytecode": "0x00"}"#).is_err());
    }
}
