//! Shared helpers for integration tests.
//!
//! Runs an in-process mock key-value server on the crate's shared runtime.
//! It speaks the wire protocol through the crate's own parser and encoder
//! and keeps a small in-memory store (strings, lists, hashes, sorted sets,
//! key expiry, numbered databases). Every test starts its own server, so
//! tests never share keys.
//!
//! Besides the data commands it understands `AUTH`, `SELECT`, `PING`,
//! `QUIT` (reply, then close), `DEBUG SLEEP <secs>` and `EVAL`: the
//! compare-and-delete unlock script is executed, any other script echoes
//! its keys and arguments back as an array.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use kvlink::resp::{encode_value, parse};
use kvlink::{runtime, Connection, ConnectionConfig, KvError, RespValue};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_INTEGER: &str = "ERR value is not an integer or out of range";
const UNLOCK_MARKER: &str = "redis.call('get',KEYS[1])==ARGV[1]";

#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    /// Require `AUTH` with this password before any other command.
    pub password: Option<String>,
    /// Split every reply into chunks of this many bytes (0 = whole).
    pub chunk: usize,
    /// Pause between chunks.
    pub chunk_delay: Duration,
}

enum Value {
    Str(String),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
    ZSet(Vec<(f64, String)>),
}

struct Entry {
    value: Value,
    expires: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self { value, expires: None }
    }

    fn expired(&self) -> bool {
        self.expires.is_some_and(|t| t <= Instant::now())
    }
}

type Key = (u16, String);
type Store = Arc<Mutex<HashMap<Key, Entry>>>;

pub struct MockServer {
    port: u16,
    store: Store,
}

impl MockServer {
    pub fn start() -> Self {
        Self::start_with(MockOptions::default())
    }

    pub fn start_with(opts: MockOptions) -> Self {
        let listener = runtime::block_on(async {
            TcpListener::bind("127.0.0.1:0").await.map_err(KvError::Io)
        })
        .expect("bind mock server");
        let port = listener.local_addr().unwrap().port();
        let store = Store::default();

        let accept_store = store.clone();
        let opts = Arc::new(opts);
        runtime::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, accept_store.clone(), opts.clone()));
            }
        })
        .expect("spawn mock server");

        Self { port, store }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Config pointing at this server with test-friendly timeouts.
    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig {
            timeout_ms: 1000,
            buffer_size: 64 * 1024,
            checkout_timeout_ms: 1000,
            ..ConnectionConfig::new("127.0.0.1", self.port)
        }
    }

    pub fn connect(&self) -> Connection {
        Connection::open(self.config()).expect("connect to mock server")
    }

    /// Whether `key` currently exists in database `db`.
    pub fn contains(&self, db: u16, key: &str) -> bool {
        self.store
            .lock()
            .get(&(db, key.to_string()))
            .is_some_and(|e| !e.expired())
    }
}

// ── Connection handling ────────────────────────────────────────────

async fn serve(mut socket: TcpStream, store: Store, opts: Arc<MockOptions>) {
    let mut session = Session {
        db: 0,
        authed: opts.password.is_none(),
    };
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        loop {
            let (request, used) = match parse(&buf) {
                Ok(parsed) => parsed,
                Err(KvError::Incomplete) => break,
                Err(_) => return,
            };
            let _ = buf.split_to(used);
            let args = request_args(request);
            let name = args.first().map(|s| s.to_ascii_uppercase()).unwrap_or_default();

            if name == "DEBUG" && args.len() == 3 && args[1].eq_ignore_ascii_case("SLEEP") {
                let secs: f64 = args[2].parse().unwrap_or(0.0);
                tokio::time::sleep(Duration::from_secs_f64(secs)).await;
            }

            let reply = session.handle(&store, &opts, &args);
            if send(&mut socket, &reply, &opts).await.is_err() || name == "QUIT" {
                return;
            }
        }

        match socket.read_buf(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

async fn send(socket: &mut TcpStream, reply: &RespValue, opts: &MockOptions) -> std::io::Result<()> {
    let mut out = Vec::new();
    encode_value(reply, &mut out);
    if opts.chunk == 0 {
        return socket.write_all(&out).await;
    }
    for chunk in out.chunks(opts.chunk) {
        socket.write_all(chunk).await?;
        socket.flush().await?;
        tokio::time::sleep(opts.chunk_delay).await;
    }
    Ok(())
}

fn request_args(request: RespValue) -> Vec<String> {
    match request {
        RespValue::Array(items) => items.iter().filter_map(RespValue::to_text).collect(),
        _ => Vec::new(),
    }
}

// ── Replies ────────────────────────────────────────────────────────

fn ok() -> RespValue {
    RespValue::SimpleString("OK".into())
}

fn int(n: i64) -> RespValue {
    RespValue::Integer(n)
}

fn bulk(s: impl Into<String>) -> RespValue {
    RespValue::BulkString(s.into().into_bytes().into())
}

fn strings<I: IntoIterator<Item = String>>(items: I) -> RespValue {
    RespValue::Array(items.into_iter().map(bulk).collect())
}

fn err(msg: impl Into<String>) -> RespValue {
    RespValue::Error(msg.into())
}

// ── Command dispatch ───────────────────────────────────────────────

struct Session {
    db: u16,
    authed: bool,
}

impl Session {
    fn handle(&mut self, store: &Store, opts: &MockOptions, args: &[String]) -> RespValue {
        let Some(name) = args.first() else {
            return err("ERR empty command");
        };
        let name = name.to_ascii_uppercase();
        let a = &args[1..];

        if name == "AUTH" {
            return self.auth(opts, a);
        }
        if !self.authed {
            return err("NOAUTH Authentication required.");
        }

        let db = self.db;
        let key = |s: &String| (db, s.clone());
        let mut map = store.lock();
        if let Some(k) = a.first() {
            purge(&mut map, &key(k));
        }

        match (name.as_str(), a.len()) {
            ("PING", 0) => RespValue::SimpleString("PONG".into()),
            ("QUIT", 0) | ("DEBUG", 2) => ok(),
            ("SELECT", 1) => match a[0].parse() {
                Ok(n) => {
                    self.db = n;
                    ok()
                }
                Err(_) => err(NOT_INTEGER),
            },

            // Strings and keys
            ("SET", n) if n >= 2 => set(&mut map, key(&a[0]), &a[1], &a[2..]),
            ("SETEX", 3) => match a[1].parse::<u64>() {
                Ok(secs) => {
                    let mut entry = Entry::new(Value::Str(a[2].clone()));
                    entry.expires = Some(Instant::now() + Duration::from_secs(secs));
                    map.insert(key(&a[0]), entry);
                    ok()
                }
                Err(_) => err(NOT_INTEGER),
            },
            ("GET", 1) => match map.get(&key(&a[0])) {
                None => RespValue::Null,
                Some(Entry { value: Value::Str(s), .. }) => bulk(s.clone()),
                Some(_) => err(WRONGTYPE),
            },
            ("DEL", n) if n >= 1 => {
                let removed = a
                    .iter()
                    .filter(|k| {
                        let k = key(*k);
                        purge(&mut map, &k);
                        map.remove(&k).is_some()
                    })
                    .count();
                int(removed as i64)
            }
            ("EXPIRE", 2) => match (a[1].parse::<u64>(), map.get_mut(&key(&a[0]))) {
                (Err(_), _) => err(NOT_INTEGER),
                (Ok(_), None) => int(0),
                (Ok(secs), Some(entry)) => {
                    entry.expires = Some(Instant::now() + Duration::from_secs(secs));
                    int(1)
                }
            },
            ("TTL", 1) => match map.get(&key(&a[0])) {
                None => int(-2),
                Some(Entry { expires: None, .. }) => int(-1),
                Some(Entry { expires: Some(t), .. }) => {
                    let ms = t.saturating_duration_since(Instant::now()).as_millis() as i64;
                    int((ms + 999) / 1000)
                }
            },
            ("INCRBY", 2) | ("DECRBY", 2) => {
                let Ok(mut by) = a[1].parse::<i64>() else {
                    return err(NOT_INTEGER);
                };
                if name == "DECRBY" {
                    by = -by;
                }
                let entry = map
                    .entry(key(&a[0]))
                    .or_insert_with(|| Entry::new(Value::Str("0".into())));
                let Value::Str(s) = &mut entry.value else {
                    return err(WRONGTYPE);
                };
                match s.parse::<i64>().ok().and_then(|n| n.checked_add(by)) {
                    Some(n) => {
                        *s = n.to_string();
                        int(n)
                    }
                    None => err(NOT_INTEGER),
                }
            }
            ("KEYS", 1) => {
                let now = Instant::now();
                let mut found: Vec<String> = map
                    .iter()
                    .filter(|((d, k), e)| {
                        *d == db && e.expires.map_or(true, |t| t > now) && glob_match(&a[0], k)
                    })
                    .map(|((_, k), _)| k.clone())
                    .collect();
                found.sort();
                strings(found)
            }

            // Lists
            ("LPUSH", n) | ("RPUSH", n) if n >= 2 => {
                let entry = map
                    .entry(key(&a[0]))
                    .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
                let Value::List(list) = &mut entry.value else {
                    return err(WRONGTYPE);
                };
                for v in &a[1..] {
                    if name == "LPUSH" {
                        list.push_front(v.clone());
                    } else {
                        list.push_back(v.clone());
                    }
                }
                int(list.len() as i64)
            }
            ("LPOP", 1) | ("RPOP", 1) => {
                let k = key(&a[0]);
                let Some(entry) = map.get_mut(&k) else {
                    return RespValue::Null;
                };
                let Value::List(list) = &mut entry.value else {
                    return err(WRONGTYPE);
                };
                let popped = if name == "LPOP" { list.pop_front() } else { list.pop_back() };
                if list.is_empty() {
                    map.remove(&k);
                }
                popped.map_or(RespValue::Null, bulk)
            }
            ("LRANGE", 3) => {
                let (Ok(start), Ok(stop)) = (a[1].parse::<i64>(), a[2].parse::<i64>()) else {
                    return err(NOT_INTEGER);
                };
                match map.get(&key(&a[0])) {
                    None => RespValue::Array(vec![]),
                    Some(Entry { value: Value::List(list), .. }) => match bounds(list.len(), start, stop) {
                        Some((s, e)) => strings(list.range(s..=e).cloned()),
                        None => RespValue::Array(vec![]),
                    },
                    Some(_) => err(WRONGTYPE),
                }
            }

            // Hashes
            ("HSET", n) if n >= 3 && n % 2 == 1 => {
                let entry = map
                    .entry(key(&a[0]))
                    .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
                let Value::Hash(hash) = &mut entry.value else {
                    return err(WRONGTYPE);
                };
                let added = a[1..]
                    .chunks(2)
                    .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                    .count();
                int(added as i64)
            }
            ("HGET", 2) => match map.get(&key(&a[0])) {
                None => RespValue::Null,
                Some(Entry { value: Value::Hash(hash), .. }) => {
                    hash.get(&a[1]).cloned().map_or(RespValue::Null, bulk)
                }
                Some(_) => err(WRONGTYPE),
            },
            ("HDEL", n) if n >= 2 => {
                let k = key(&a[0]);
                let Some(entry) = map.get_mut(&k) else {
                    return int(0);
                };
                let Value::Hash(hash) = &mut entry.value else {
                    return err(WRONGTYPE);
                };
                let removed = a[1..].iter().filter(|f| hash.remove(*f).is_some()).count();
                if hash.is_empty() {
                    map.remove(&k);
                }
                int(removed as i64)
            }
            ("HLEN", 1) => match map.get(&key(&a[0])) {
                None => int(0),
                Some(Entry { value: Value::Hash(hash), .. }) => int(hash.len() as i64),
                Some(_) => err(WRONGTYPE),
            },

            // Sorted sets
            ("ZADD", n) if n >= 3 && n % 2 == 1 => {
                let mut pairs = Vec::new();
                for pair in a[1..].chunks(2) {
                    match pair[0].parse::<f64>() {
                        Ok(score) => pairs.push((score, pair[1].clone())),
                        Err(_) => return err("ERR value is not a valid float"),
                    }
                }
                let entry = map
                    .entry(key(&a[0]))
                    .or_insert_with(|| Entry::new(Value::ZSet(Vec::new())));
                let Value::ZSet(set) = &mut entry.value else {
                    return err(WRONGTYPE);
                };
                let mut added = 0;
                for (score, member) in pairs {
                    match set.iter_mut().find(|(_, m)| *m == member) {
                        Some(existing) => existing.0 = score,
                        None => {
                            set.push((score, member));
                            added += 1;
                        }
                    }
                }
                set.sort_by(|x, y| x.0.total_cmp(&y.0).then_with(|| x.1.cmp(&y.1)));
                int(added)
            }
            ("ZREM", n) if n >= 2 => {
                let k = key(&a[0]);
                let Some(entry) = map.get_mut(&k) else {
                    return int(0);
                };
                let Value::ZSet(set) = &mut entry.value else {
                    return err(WRONGTYPE);
                };
                let before = set.len();
                set.retain(|(_, m)| !a[1..].contains(m));
                let removed = before - set.len();
                if set.is_empty() {
                    map.remove(&k);
                }
                int(removed as i64)
            }
            ("ZRANGE", 3) | ("ZRANGE", 4) => {
                let with_scores = match a.get(3) {
                    None => false,
                    Some(opt) if opt.eq_ignore_ascii_case("WITHSCORES") => true,
                    Some(_) => return err("ERR syntax error"),
                };
                let (Ok(start), Ok(stop)) = (a[1].parse::<i64>(), a[2].parse::<i64>()) else {
                    return err(NOT_INTEGER);
                };
                match map.get(&key(&a[0])) {
                    None => RespValue::Array(vec![]),
                    Some(Entry { value: Value::ZSet(set), .. }) => match bounds(set.len(), start, stop) {
                        Some((s, e)) => strings(set[s..=e].iter().flat_map(|(score, m)| {
                            let mut out = vec![m.clone()];
                            if with_scores {
                                out.push(score.to_string());
                            }
                            out
                        })),
                        None => RespValue::Array(vec![]),
                    },
                    Some(_) => err(WRONGTYPE),
                }
            }

            // Scripting
            ("EVAL", n) if n >= 2 => {
                let Ok(numkeys) = a[1].parse::<usize>() else {
                    return err(NOT_INTEGER);
                };
                if a.len() < 2 + numkeys {
                    return err("ERR Number of keys can't be greater than number of args");
                }
                let keys = &a[2..2 + numkeys];
                let argv = &a[2 + numkeys..];

                if a[0].contains(UNLOCK_MARKER) {
                    let (Some(k), Some(expected)) = (keys.first(), argv.first()) else {
                        return int(0);
                    };
                    let k = key(k);
                    purge(&mut map, &k);
                    let held = matches!(
                        map.get(&k),
                        Some(Entry { value: Value::Str(v), .. }) if v == expected
                    );
                    if held {
                        map.remove(&k);
                    }
                    return int(held as i64);
                }
                strings(keys.iter().chain(argv).cloned())
            }

            _ => err(format!("ERR unknown command '{name}', or wrong number of arguments")),
        }
    }

    fn auth(&mut self, opts: &MockOptions, a: &[String]) -> RespValue {
        let Some(expected) = &opts.password else {
            return err("ERR AUTH <password> called without any password configured");
        };
        match a.last() {
            Some(given) if given == expected && a.len() <= 2 => {
                self.authed = true;
                ok()
            }
            _ => err("WRONGPASS invalid username-password pair or user is disabled."),
        }
    }
}

/// `SET key value [NX|XX] [EX secs|PX ms]`
fn set(map: &mut HashMap<Key, Entry>, k: Key, value: &str, opts: &[String]) -> RespValue {
    let mut nx = false;
    let mut xx = false;
    let mut ttl = None;
    let mut iter = opts.iter();
    while let Some(opt) = iter.next() {
        match opt.to_ascii_uppercase().as_str() {
            "NX" => nx = true,
            "XX" => xx = true,
            unit @ ("EX" | "PX") => {
                let Some(Ok(n)) = iter.next().map(|v| v.parse::<u64>()) else {
                    return err(NOT_INTEGER);
                };
                ttl = Some(if unit == "EX" {
                    Duration::from_secs(n)
                } else {
                    Duration::from_millis(n)
                });
            }
            _ => return err("ERR syntax error"),
        }
    }

    let exists = map.contains_key(&k);
    if (nx && exists) || (xx && !exists) {
        return RespValue::Null;
    }
    let mut entry = Entry::new(Value::Str(value.to_string()));
    entry.expires = ttl.map(|d| Instant::now() + d);
    map.insert(k, entry);
    ok()
}

fn purge(map: &mut HashMap<Key, Entry>, k: &Key) {
    if map.get(k).is_some_and(Entry::expired) {
        map.remove(k);
    }
}

/// Inclusive index range for `start..=stop` with negative indices from the end.
fn bounds(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = (if start < 0 { len + start } else { start }).max(0);
    let stop = (if stop < 0 { len + stop } else { stop }).min(len - 1);
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Glob match supporting `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn go(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => go(&p[1..], t) || (!t.is_empty() && go(p, &t[1..])),
            (Some(b'?'), Some(_)) => go(&p[1..], &t[1..]),
            (Some(a), Some(b)) if a == b => go(&p[1..], &t[1..]),
            _ => false,
        }
    }
    go(pattern.as_bytes(), text.as_bytes())
}
