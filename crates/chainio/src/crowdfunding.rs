//! Events emitted by the crowdfunding contract.
use alloy::sol;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq, Eq)]
    interface ICrowdfunding {
        event ProjectCreated(uint256 indexed projectId, string title, uint256 targetAmount, address creator);
        event ProjectStatusChanged(uint256 indexed projectId, uint8 status);
        event ContributionMade(uint256 indexed projectId, address indexed contributor, uint256 amount);
        event RefundProcessed(uint256 indexed projectId, address indexed refundee, uint256 amount, string reason);
    }
}

#[cfg(test)]
mod tests {
    use super::ICrowdfunding::{ContributionMade, ProjectStatusChanged};

    use alloy::{
        primitives::{U256, address},
        sol_types::SolEvent,
    };

    #[test]
    fn signatures_match_abi_definitions() {
        assert_eq!(ContributionMade::SIGNATURE, "ContributionMade(uint256,address,uint256)");
        assert_eq!(ProjectStatusChanged::SIGNATURE, "ProjectStatusChanged(uint256,uint8)");
    }

    #[test]
    fn indexed_fields_land_in_topics() {
        let event = ContributionMade {
            projectId: U256::from(42),
            contributor: address!("0x00000000000000000000000000000000000000c0"),
            amount: U256::from(1_000u64),
        };
        let data = event.encode_log_data();

        assert_eq!(data.topics().len(), 3);
        assert_eq!(data.topics()[0], ContributionMade::SIGNATURE_HASH);
        assert_eq!(data.data.len(), 32);
    }
}
