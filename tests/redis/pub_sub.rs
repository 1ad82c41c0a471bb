use crate::test_utils::{bulk, integer, TestEnv};

fn confirmation(kind: &str, channel: &str, count: i64) -> String {
    format!("*3\r\n{}{}{}", bulk(kind), bulk(channel), integer(count))
}

#[tokio::test]
async fn test_publish_reaches_subscribers() {
    let mut env = TestEnv::new();
    let publisher = env.connect();
    let first = env.connect();
    let second = env.connect();

    assert_eq!(
        env.command(first, &["SUBSCRIBE", "news", "sport"]),
        confirmation("subscribe", "news", 1) + &confirmation("subscribe", "sport", 2)
    );
    assert_eq!(
        env.command(second, &["SUBSCRIBE", "news"]),
        confirmation("subscribe", "news", 1)
    );

    assert_eq!(env.command(publisher, &["PUBLISH", "news", "hi"]), integer(2));
    assert_eq!(env.command(publisher, &["PUBLISH", "weather", "rain"]), integer(0));

    let message = format!("*3\r\n{}{}{}", bulk("message"), bulk("news"), bulk("hi"));
    assert_eq!(String::from_utf8_lossy(&env.output(first)), message);
    assert_eq!(String::from_utf8_lossy(&env.output(second)), message);

    assert_eq!(
        env.command(first, &["UNSUBSCRIBE", "news"]),
        confirmation("unsubscribe", "news", 1)
    );
    assert_eq!(env.command(publisher, &["PUBLISH", "news", "again"]), integer(1));

    env.disconnect(second);
    assert_eq!(env.command(publisher, &["PUBLISH", "news", "gone"]), integer(0));
    assert_eq!(env.state().pub_sub.channel_count(), 1);
}

#[tokio::test]
async fn test_unsubscribe_from_everything() {
    let mut env = TestEnv::new();
    let client = env.connect();

    assert_eq!(
        env.command(client, &["UNSUBSCRIBE"]),
        "*3\r\n$11\r\nunsubscribe\r\n$-1\r\n:0\r\n"
    );

    env.command(client, &["SUBSCRIBE", "a", "b"]);

    assert_eq!(
        env.command(client, &["UNSUBSCRIBE"]),
        confirmation("unsubscribe", "a", 1) + &confirmation("unsubscribe", "b", 0)
    );
    assert_eq!(env.state().pub_sub.channel_count(), 0);
}
