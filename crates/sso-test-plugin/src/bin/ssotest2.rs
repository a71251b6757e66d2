//! `signon-plugin-ssotest2`: the fixture plugin without `BLOB` support,
//! used to test that mechanism enumeration is genuinely per-plugin.

#[tokio::main]
async fn main() {
    sso_test_plugin::run("ssotest2", &["mech1", "mech2", "mech3"]).await;
}
