//! `signon-plugin-ssotest`: the richer of the two fixture plugins,
//! supporting the `BLOB` mechanism in addition to `mech1`/`mech2`/`mech3`.

#[tokio::main]
async fn main() {
    sso_test_plugin::run("ssotest", &["mech1", "mech2", "mech3", "BLOB"]).await;
}
