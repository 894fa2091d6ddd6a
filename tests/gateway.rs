use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use kserver::{
    bind, Executor, Gateway, GatewayServer, HttpReply, MemoryEngine, SharedQueueThreadPool, ThreadPool, TlsConfig,
    STRFAIL, STRNOFOUND, STROK,
};
use serde_json::{json, Value};

fn gateway(page_size: u64) -> Gateway<MemoryEngine> {
    Gateway::new(Executor::new(MemoryEngine::new(), page_size))
}

fn post(gw: &Gateway<MemoryEngine>, path: &str, body: &str) -> HttpReply {
    gw.dispatch("POST", path, body.as_bytes())
}

fn json_of(reply: &HttpReply) -> Value {
    assert_eq!(reply.status, 200, "{:?}", reply);
    serde_json::from_str(&reply.body).unwrap()
}

#[test]
fn register_then_get_or_create() {
    let gw = gateway(20);

    let reply = post(&gw, "/userregister", r#"{"machine":"m1","username":"alice","flag":1}"#);
    assert_eq!(json_of(&reply), json!({"machine":"m1","username":"alice"}));

    // flag 0 returns the existing registration untouched
    let reply = post(&gw, "/userregister", r#"{"machine":"m1","username":"bob","flag":0}"#);
    assert_eq!(json_of(&reply), json!({"machine":"m1","username":"alice"}));

    // flag 1 overwrites it
    let reply = post(&gw, "/userregister", r#"{"machine":"m1","username":"bob","flag":1}"#);
    assert_eq!(json_of(&reply), json!({"machine":"m1","username":"bob"}));

    let reply = post(&gw, "/userget", r#"{"machine":"m1"}"#);
    assert_eq!(json_of(&reply), json!({"machine":"m1","username":"bob"}));
}

#[test]
fn registration_flag_must_be_zero_or_one() {
    let gw = gateway(20);
    let reply = post(&gw, "/userregister", r#"{"machine":"m1","username":"alice","flag":7}"#);
    assert_eq!(reply, HttpReply { status: 404, body: STRFAIL.to_string() });
}

#[test]
fn file_set_is_idempotent_and_body_is_kept_verbatim() {
    let gw = gateway(20);
    let body = r#"{"machine":"m1","uuid":"f1","name":"a file with spaces","size":42}"#;

    for _ in 0..2 {
        assert_eq!(post(&gw, "/fileset", body), HttpReply { status: 200, body: STROK.to_string() });
    }
    let reply = post(&gw, "/fileget", r#"{"uuid":"f1"}"#);
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, body);
}

#[test]
fn missing_file_is_nofound_not_fail() {
    let gw = gateway(20);
    let reply = post(&gw, "/fileget", r#"{"uuid":"nope"}"#);
    assert_eq!(reply, HttpReply { status: 200, body: STRNOFOUND.to_string() });
}

#[test]
fn listing_a_machine_with_no_files_is_an_empty_page() {
    let gw = gateway(20);
    let page = json_of(&post(&gw, "/filegetall", r#"{"machine":"empty","page":0}"#));
    assert_eq!(page, json!({"page":0,"files":[]}));
}

#[test]
fn file_cursor_chaining_visits_every_file_once() {
    let gw = gateway(3);
    let mut expected = HashSet::new();
    for i in 0..10 {
        let uuid = format!("file-{}", i);
        let body = json!({"machine":"m1","uuid":uuid,"n":i}).to_string();
        assert_eq!(post(&gw, "/fileset", &body).status, 200);
        expected.insert(uuid);
    }
    // another machine's files must not show up
    post(&gw, "/fileset", r#"{"machine":"m2","uuid":"other"}"#);

    let mut seen = HashSet::new();
    let mut cursor = 0u64;
    let mut rounds = 0;
    loop {
        let body = json!({"machine":"m1","page":cursor}).to_string();
        let page = json_of(&post(&gw, "/filegetall", &body));
        for file in page["files"].as_array().unwrap() {
            let uuid = file["uuid"].as_str().unwrap().to_string();
            assert!(seen.insert(uuid), "file listed twice");
        }
        cursor = page["page"].as_u64().unwrap();
        rounds += 1;
        if cursor == 0 {
            break;
        }
        assert!(rounds < 20, "cursor never came back to 0");
    }
    assert_eq!(seen, expected);
    assert!(rounds > 1);
}

#[test]
fn trace_cursor_chaining_visits_every_trace_once() {
    let gw = gateway(2);
    post(&gw, "/fileset", r#"{"machine":"m1","uuid":"f1"}"#);
    for i in 0..5 {
        let body = json!({"uuid":"f1","step":i}).to_string();
        assert_eq!(post(&gw, "/filesettrace", &body), HttpReply { status: 200, body: STROK.to_string() });
        thread::sleep(Duration::from_millis(2));
    }

    let mut steps = Vec::new();
    let mut cursor = 0u64;
    loop {
        let body = json!({"uuid":"f1","page":cursor}).to_string();
        let page = json_of(&post(&gw, "/filegettrace", &body));
        for trace in page["traces"].as_array().unwrap() {
            steps.push(trace["step"].as_u64().unwrap());
        }
        cursor = page["page"].as_u64().unwrap();
        if cursor == 0 {
            break;
        }
    }
    // the file record itself shares the hash but is not a trace
    assert_eq!(steps, vec![0, 1, 2, 3, 4]);
}

#[test]
fn bad_requests_are_rejected_with_fail() {
    let gw = gateway(20);
    let fail = HttpReply { status: 404, body: STRFAIL.to_string() };

    assert_eq!(post(&gw, "/fileset", "not json"), fail);
    assert_eq!(post(&gw, "/fileset", r#"{"uuid":"f1"}"#), fail);
    assert_eq!(post(&gw, "/filegetall", r#"{"machine":"m1","page":-1}"#), fail);
    assert_eq!(post(&gw, "/nosuchthing", "{}"), fail);
    assert_eq!(gw.dispatch("GET", "/fileget", br#"{"uuid":"f1"}"#), fail);
}

fn start_server() -> SocketAddr {
    let listener = bind("127.0.0.1:0".parse().unwrap(), &TlsConfig::default()).unwrap();
    let addr = listener.server_addr().to_ip().unwrap();
    let pool = SharedQueueThreadPool::new(4).unwrap();
    let server = GatewayServer::new(gateway(20), pool);
    thread::spawn(move || server.run(listener));
    addr
}

fn http_post(addr: SocketAddr, path: &str, body: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    write!(
        stream,
        "POST {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        path,
        body.len(),
        body
    )
    .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    let status = response.split_whitespace().nth(1).unwrap().parse().unwrap();
    let body = response.split("\r\n\r\n").nth(1).unwrap_or_default().to_string();
    (status, body)
}

#[test]
fn serves_over_http() {
    let addr = start_server();

    let (status, body) = http_post(addr, "/fileset", r#"{"machine":"m1","uuid":"f1"}"#);
    assert_eq!((status, body.as_str()), (200, STROK));

    let (status, body) = http_post(addr, "/fileget", r#"{"uuid":"f1"}"#);
    assert_eq!(status, 200);
    assert_eq!(body, r#"{"machine":"m1","uuid":"f1"}"#);

    let (status, body) = http_post(addr, "/missing", "{}");
    assert_eq!((status, body.as_str()), (404, STRFAIL));
}
