//! Property tests for request persistence.

use proptest::prelude::*;
use txkv_codec::{from_cbor, to_cbor};
use txkv_core::Request;
use txkv_testkit::generators::{attribute_value_strategy, item_strategy, request_strategy};

proptest! {
    #[test]
    fn stored_request_reencodes_to_same_bytes(request in request_strategy()) {
        let bytes = request.to_bytes().unwrap();
        let decoded = Request::from_bytes(&bytes).unwrap();
        prop_assert_eq!(&decoded, &request);
        prop_assert_eq!(decoded.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn attribute_values_reencode_to_same_bytes(value in attribute_value_strategy()) {
        let bytes = to_cbor(&value).unwrap();
        let decoded: txkv_codec::AttributeValue = from_cbor(&bytes).unwrap();
        prop_assert_eq!(to_cbor(&decoded).unwrap(), bytes);
    }

    #[test]
    fn items_reencode_to_same_bytes(item in item_strategy()) {
        let bytes = to_cbor(&item).unwrap();
        let decoded: txkv_codec::Item = from_cbor(&bytes).unwrap();
        prop_assert_eq!(&decoded, &item);
        prop_assert_eq!(to_cbor(&decoded).unwrap(), bytes);
    }
}

#[test]
fn corrupt_request_bytes_are_a_codec_error() {
    let err = Request::from_bytes(&[0xff, 0x00]).unwrap_err();
    assert!(matches!(err, txkv_core::TxError::Codec(_)), "{err:?}");
}
