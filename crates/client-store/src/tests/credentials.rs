use super::test_db;

#[test]
fn test_credentials_crud() {
    let db = test_db();
    assert!(db.get_credential("token").unwrap().is_none());
    assert!(db.credential_saved_at("token").unwrap().is_none());

    db.save_credential("token", "abc").unwrap();
    assert_eq!(db.get_credential("token").unwrap(), Some("abc".into()));
    assert!(db.credential_saved_at("token").unwrap().unwrap() > 0);

    db.save_credential("token", "def").unwrap();
    assert_eq!(db.get_credential("token").unwrap(), Some("def".into()));

    db.delete_credential("token").unwrap();
    assert!(db.get_credential("token").unwrap().is_none());
}

#[test]
fn test_delete_all_credentials() {
    let db = test_db();
    db.save_credential("token", "abc").unwrap();
    db.save_credential("refresh", "xyz").unwrap();

    db.delete_all_credentials().unwrap();
    assert!(db.get_credential("token").unwrap().is_none());
    assert!(db.get_credential("refresh").unwrap().is_none());
}
