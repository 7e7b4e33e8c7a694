use bequest_crypto::{
    create_item, decrypt, derive_bundle_key, open_bundle_note, open_item, unwrap_key,
    wrap_bundle_note, wrap_item_for_bundle, CryptoError, ExtractableKey, OpaqueKey, ReleaseToken,
};

fn data_key() -> OpaqueKey {
    ExtractableKey::generate().into_opaque()
}

#[test]
fn bundle_rewrap_preserves_content() {
    let owner_key = data_key();
    let sealed = create_item(b"deed to the house", &owner_key).unwrap();

    let token = ReleaseToken::generate();
    let bundle_key = derive_bundle_key(&token).unwrap();

    let bundle_envelope =
        wrap_item_for_bundle(&sealed.key_envelope, &owner_key, &bundle_key).unwrap();

    // The trustee path: derive the bundle key from the token alone, unwrap
    // the re-wrapped content key, decrypt the untouched ciphertext.
    let trustee_key = derive_bundle_key(&ReleaseToken::decode(&token.encode()).unwrap()).unwrap();
    let content_key = unwrap_key(&bundle_envelope, &trustee_key).unwrap();
    let via_bundle = decrypt(&content_key, &sealed.ciphertext).unwrap();

    // The owner path still works and yields byte-identical plaintext.
    let via_owner = open_item(&sealed, &owner_key).unwrap();
    assert_eq!(via_bundle, via_owner);
    assert_eq!(via_bundle, b"deed to the house");
}

#[test]
fn rewrap_does_not_touch_ciphertext() {
    let owner_key = data_key();
    let sealed = create_item(b"content", &owner_key).unwrap();
    let before = sealed.ciphertext.clone();

    let bundle_key = derive_bundle_key(&ReleaseToken::generate()).unwrap();
    wrap_item_for_bundle(&sealed.key_envelope, &owner_key, &bundle_key).unwrap();

    assert_eq!(sealed.ciphertext, before);
}

#[test]
fn rewrap_with_wrong_data_key_fails() {
    let sealed = create_item(b"content", &data_key()).unwrap();
    let bundle_key = derive_bundle_key(&ReleaseToken::generate()).unwrap();

    let result = wrap_item_for_bundle(&sealed.key_envelope, &data_key(), &bundle_key);
    assert_eq!(result.unwrap_err(), CryptoError::DecryptionFailed);
}

#[test]
fn wrong_token_cannot_unwrap_bundle_envelope() {
    let owner_key = data_key();
    let sealed = create_item(b"content", &owner_key).unwrap();

    let bundle_key = derive_bundle_key(&ReleaseToken::generate()).unwrap();
    let bundle_envelope =
        wrap_item_for_bundle(&sealed.key_envelope, &owner_key, &bundle_key).unwrap();

    let wrong_key = derive_bundle_key(&ReleaseToken::generate()).unwrap();
    assert_eq!(
        unwrap_key(&bundle_envelope, &wrong_key).unwrap_err(),
        CryptoError::DecryptionFailed
    );
}

#[test]
fn bundle_note_roundtrip() {
    let bundle_key = derive_bundle_key(&ReleaseToken::generate()).unwrap();

    let note = "The lawyer's number is in the blue folder.";
    let sealed = wrap_bundle_note(note, &bundle_key).unwrap();
    assert_eq!(open_bundle_note(&sealed, &bundle_key).unwrap(), note);
}

#[test]
fn bundle_note_wrong_key_fails() {
    let sealed =
        wrap_bundle_note("note", &derive_bundle_key(&ReleaseToken::generate()).unwrap()).unwrap();

    let wrong = derive_bundle_key(&ReleaseToken::generate()).unwrap();
    assert_eq!(
        open_bundle_note(&sealed, &wrong).unwrap_err(),
        CryptoError::DecryptionFailed
    );
}

#[test]
fn tokens_have_full_entropy_encoding() {
    // 32 bytes -> 43 chars of unpadded URL-safe base64
    let token = ReleaseToken::generate();
    assert_eq!(token.encode().len(), 43);
}
