use crate::test_utils::{bulk, integer, null, ok, TestEnv};

#[tokio::test]
async fn test_string_commands() {
    let mut env = TestEnv::new();
    let client = env.connect();

    let test_cases = vec![
        (vec!["PING"], "+PONG\r\n".to_string()),
        (vec!["ping", "hello"], bulk("hello")),
        (vec!["ECHO", "hey"], bulk("hey")),
        (vec!["GET", "a"], null()),
        (vec!["SET", "a", "1"], ok()),
        (vec!["GET", "a"], bulk("1")),
        (vec!["set", "a", "2"], ok()),
        (vec!["GET", "a"], bulk("2")),
        (vec!["MSET", "b", "x", "c", "y"], ok()),
        (
            vec!["MGET", "a", "nope", "c"],
            "*3\r\n$1\r\n2\r\n$-1\r\n$1\r\ny\r\n".to_string(),
        ),
        (vec!["EXISTS", "a", "b", "nope", "a"], integer(3)),
        (vec!["DBSIZE"], integer(3)),
        (vec!["DEL", "a", "nope", "b"], integer(2)),
        (vec!["DBSIZE"], integer(1)),
    ];

    for (command, expected) in test_cases {
        assert_eq!(env.command(client, &command), expected, "{:?}", command);
    }
}

#[tokio::test]
async fn test_list_commands() {
    let mut env = TestEnv::new();
    let client = env.connect();

    let test_cases = vec![
        (vec!["RPUSHX", "list", "a"], integer(0)),
        (vec!["RPUSH", "list", "b", "c"], integer(2)),
        (vec!["LPUSH", "list", "a"], integer(3)),
        (vec!["LPUSHX", "list", "z"], integer(4)),
        (vec!["LLEN", "list"], integer(4)),
        (
            vec!["LRANGE", "list", "0", "-1"],
            "*4\r\n$1\r\nz\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n".to_string(),
        ),
        (
            vec!["LRANGE", "list", "-2", "10"],
            "*2\r\n$1\r\nb\r\n$1\r\nc\r\n".to_string(),
        ),
        (vec!["LRANGE", "list", "5", "6"], "*0\r\n".to_string()),
        (vec!["LPOP", "list"], bulk("z")),
        (
            vec!["LPOP", "list", "2"],
            "*2\r\n$1\r\na\r\n$1\r\nb\r\n".to_string(),
        ),
        (vec!["LPOP", "list", "5"], "*1\r\n$1\r\nc\r\n".to_string()),
        (vec!["EXISTS", "list"], integer(0)),
        (vec!["LPOP", "list"], null()),
        (vec!["LLEN", "list"], integer(0)),
    ];

    for (command, expected) in test_cases {
        assert_eq!(env.command(client, &command), expected, "{:?}", command);
    }
}

#[tokio::test]
async fn test_errors() {
    let mut env = TestEnv::new();
    let client = env.connect();

    env.command(client, &["SET", "s", "v"]);
    env.command(client, &["RPUSH", "l", "v"]);

    let wrong_type = "-WRONGTYPE Operation against a key holding the wrong kind of value\r\n";

    let test_cases = vec![
        (vec!["FOO"], "-ERR unknown command 'FOO'\r\n"),
        (
            vec!["GET"],
            "-ERR wrong number of arguments for 'get' command\r\n",
        ),
        (
            vec!["SET", "a"],
            "-ERR wrong number of arguments for 'set' command\r\n",
        ),
        (vec!["SET", "a", "1", "EX", "1"], "-ERR syntax error\r\n"),
        (
            vec!["SET", "a", "1", "PX", "-5"],
            "-ERR invalid expire time in 'set' command\r\n",
        ),
        (vec!["GET", "l"], wrong_type),
        (vec!["RPUSH", "s", "x"], wrong_type),
        (vec!["LRANGE", "s", "0", "1"], wrong_type),
        (
            vec!["LRANGE", "l", "a", "1"],
            "-ERR value is not an integer or out of range\r\n",
        ),
        (vec!["SELECT", "16"], "-ERR DB index is out of range\r\n"),
        (
            vec!["MSET", "a", "1", "b"],
            "-ERR wrong number of arguments for 'mset' command\r\n",
        ),
    ];

    for (command, expected) in test_cases {
        assert_eq!(env.command(client, &command), expected, "{:?}", command);
    }
}

#[tokio::test]
async fn test_select_isolates_databases() {
    let mut env = TestEnv::new();
    let first = env.connect();
    let second = env.connect();

    env.command(first, &["SET", "a", "zero"]);
    assert_eq!(env.command(first, &["SELECT", "3"]), ok());
    assert_eq!(env.command(first, &["GET", "a"]), null());
    env.command(first, &["SET", "a", "three"]);

    // Each connection keeps its own selected database.
    assert_eq!(env.command(second, &["GET", "a"]), bulk("zero"));
    assert_eq!(env.command(first, &["GET", "a"]), bulk("three"));

    assert_eq!(env.command(second, &["FLUSHALL"]), ok());
    assert_eq!(env.command(first, &["DBSIZE"]), integer(0));
}

#[tokio::test]
async fn test_expiry() {
    let mut env = TestEnv::new();
    let client = env.connect();

    let past = (regis::key_value_store::now_ms() - 1000).to_string();
    let future = (regis::key_value_store::now_ms() + 60_000).to_string();

    env.command(client, &["SET", "old", "v", "PXAT", &past]);
    assert_eq!(env.command(client, &["GET", "old"]), null());
    assert_eq!(env.command(client, &["EXISTS", "old"]), integer(0));

    env.command(client, &["SET", "a", "v"]);
    assert_eq!(env.command(client, &["PEXPIREAT", "a", &future]), integer(1));
    assert_eq!(env.command(client, &["GET", "a"]), bulk("v"));
    assert_eq!(
        env.state_mut().partition(0).unwrap().expiry("a"),
        Some(future.parse::<i64>().unwrap())
    );

    assert_eq!(env.command(client, &["PEXPIREAT", "a", &past]), integer(1));
    assert_eq!(env.command(client, &["GET", "a"]), null());
    assert_eq!(env.command(client, &["PEXPIREAT", "a", &future]), integer(0));

    // Pushing to a list keeps its expiry.
    env.command(client, &["RPUSH", "l", "x"]);
    env.command(client, &["PEXPIREAT", "l", &future]);
    env.command(client, &["RPUSH", "l", "y"]);
    assert_eq!(
        env.state_mut().partition(0).unwrap().expiry("l"),
        Some(future.parse::<i64>().unwrap())
    );

    // SET without options clears it.
    env.command(client, &["SET", "l", "plain"]);
    assert_eq!(env.state_mut().partition(0).unwrap().expiry("l"), None);
}

#[tokio::test]
async fn test_info_and_debug() {
    let mut env = TestEnv::new();
    let client = env.connect();

    env.command(client, &["SET", "a", "1"]);

    let info = env.command(client, &["INFO", "replication"]);
    assert!(info.contains("role:master"), "{}", info);
    assert!(info.contains("connected_slaves:0"), "{}", info);
    assert!(info.contains("repl_backlog_active:0"), "{}", info);

    let keyspace = env.command(client, &["INFO", "keyspace"]);
    assert!(keyspace.contains("db0:keys=1,expires=0"), "{}", keyspace);

    assert_eq!(env.command(client, &["DEBUG", "POPULATE", "5"]), ok());
    assert_eq!(env.command(client, &["DBSIZE"]), integer(6));
    assert_eq!(env.command(client, &["GET", "key:4"]), bulk("value:4"));

    let object = env.command(client, &["DEBUG", "OBJECT", "a"]);
    assert!(object.starts_with("+Value type:string"), "{}", object);
    assert_eq!(
        env.command(client, &["DEBUG", "OBJECT", "nope"]),
        "-ERR no such key\r\n"
    );
    assert_eq!(env.command(client, &["DEBUG", "ERROR", "BOOM"]), "-BOOM\r\n");
    assert_eq!(env.command(client, &["DEBUG", "BUFFER", "0"]), null());
    assert_eq!(
        env.command(client, &["DEBUG", "CLOSE", "999"]),
        "-ERR No such client\r\n"
    );

    assert_eq!(env.command(client, &["DEBUG", "RELOAD"]), ok());
    assert_eq!(env.command(client, &["DBSIZE"]), integer(6));
    assert_eq!(env.command(client, &["GET", "a"]), bulk("1"));
}

#[tokio::test]
async fn test_debug_close() {
    let mut env = TestEnv::new();
    let admin = env.connect();
    let victim = env.connect();

    assert_eq!(
        env.command(admin, &["DEBUG", "CLOSE", &victim.to_string()]),
        ok()
    );
    assert!(env.was_closed(victim));
}
