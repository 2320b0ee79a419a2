pub const ROOT_ENDPOINT: &str = "/";

pub async fn root() -> &'static str {
    "relay ok"
}
