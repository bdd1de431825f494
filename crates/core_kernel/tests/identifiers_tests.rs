//! Unit tests for the identifier newtypes and the transfer reference

use core_kernel::{
    PrincipalAccountId, SubAccountId, TransactionId, TransferReference, UserId,
};

mod typed_ids {
    use super::*;

    #[test]
    fn test_round_trip_through_raw_value() {
        let id = TransactionId::new(42);
        assert_eq!(id.as_i64(), 42);
        assert_eq!(i64::from(id), 42);
        assert_eq!(TransactionId::from(42), id);
    }

    #[test]
    fn test_ordering_follows_raw_value() {
        assert!(TransactionId::new(1) < TransactionId::new(2));
        assert!(PrincipalAccountId::new(10) > PrincipalAccountId::new(3));
    }

    #[test]
    fn test_display_is_the_raw_value() {
        assert_eq!(UserId::new(7).to_string(), "7");
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = SubAccountId::new(99);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "99");
        assert_eq!(serde_json::from_str::<SubAccountId>("99").unwrap(), id);
    }
}

mod transfer_reference {
    use super::*;

    #[test]
    fn test_generated_references_are_unique() {
        let a = TransferReference::generate();
        let b = TransferReference::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_generated_references_carry_the_prefix() {
        let reference = TransferReference::generate();
        assert!(reference.as_str().starts_with("TRF-"));
    }

    #[test]
    fn test_parsing_preserves_the_raw_string() {
        let reference: TransferReference = "TRF-abc".parse().unwrap();
        assert_eq!(reference.as_str(), "TRF-abc");
        assert_eq!(reference, TransferReference::from_string("TRF-abc"));
    }
}
