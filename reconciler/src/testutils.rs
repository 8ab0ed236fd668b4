use crate::cache::{Bucket, CacheError, CacheNode};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Default)]
struct MockState {
    store: Mutex<BTreeMap<String, Vec<u8>>>,
    commands: Mutex<Vec<String>>,
    failure: Mutex<Option<String>>,
    // Keys listed by cachedump but not retrievable
    raw_keys: Mutex<Vec<Vec<u8>>>,
}

/// In-process memcached speaking enough of the text protocol for the
/// reconciler: `stats items`, `stats cachedump`, `get` and `delete`.
/// All items live in slab 1; slab 2 is always reported empty.
pub struct MockMemcachedServer {
    addr: String,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockMemcachedServer {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(MockState::default());

        let server_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = server_state.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, state).await;
                });
            }
        });

        MockMemcachedServer {
            addr,
            state,
            handle,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn insert<V: Into<Vec<u8>>>(&self, key: &str, value: V) {
        self.state
            .store
            .lock()
            .unwrap()
            .insert(key.to_string(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.store.lock().unwrap().contains_key(key)
    }

    /// List `key` in slab 1 as is, whatever its bytes.
    pub fn list_raw_key(&self, key: &[u8]) {
        self.state.raw_keys.lock().unwrap().push(key.to_vec());
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.commands.lock().unwrap().clone()
    }

    /// Answer every subsequent command with `line`.
    pub fn fail_with(&self, line: &str) {
        *self.state.failure.lock().unwrap() = Some(line.to_string());
    }
}

impl Drop for MockMemcachedServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(stream: TcpStream, state: Arc<MockState>) -> io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Some(line) = lines.next_line().await? {
        state.commands.lock().unwrap().push(line.clone());
        let response = respond(&line, &state);
        write.write_all(&response).await?;
        write.flush().await?;
    }
    Ok(())
}

fn respond(line: &str, state: &MockState) -> Vec<u8> {
    if let Some(failure) = state.failure.lock().unwrap().as_ref() {
        return format!("{failure}\r\n").into_bytes();
    }

    let mut store = state.store.lock().unwrap();
    let raw_keys = state.raw_keys.lock().unwrap();
    let parts: Vec<&str> = line.split_whitespace().collect();

    match parts.as_slice() {
        ["stats", "items"] => format!(
            "STAT items:1:number {}\r\nSTAT items:1:age 10\r\nSTAT items:2:number 0\r\nSTAT items:2:age 0\r\nEND\r\n",
            store.len() + raw_keys.len()
        )
        .into_bytes(),
        ["stats", "cachedump", "1", _] => {
            let mut response = Vec::new();
            for raw in raw_keys.iter() {
                response.extend_from_slice(b"ITEM ");
                response.extend_from_slice(raw);
                response.extend_from_slice(b" [1 b; 0 s]\r\n");
            }
            for (key, value) in store.iter() {
                response.extend_from_slice(
                    format!("ITEM {key} [{} b; 0 s]\r\n", value.len()).as_bytes(),
                );
            }
            response.extend_from_slice(b"END\r\n");
            response
        }
        ["stats", "cachedump", _, _] => b"END\r\n".to_vec(),
        ["get", key] => match store.get(*key) {
            Some(value) => {
                let mut response = format!("VALUE {key} 0 {}\r\n", value.len()).into_bytes();
                response.extend_from_slice(value);
                response.extend_from_slice(b"\r\nEND\r\n");
                response
            }
            None => b"END\r\n".to_vec(),
        },
        ["delete", key] => match store.remove(*key) {
            Some(_) => b"DELETED\r\n".to_vec(),
            None => b"NOT_FOUND\r\n".to_vec(),
        },
        _ => b"ERROR\r\n".to_vec(),
    }
}

/// Cache node kept entirely in memory. An unreachable node fails every
/// operation with an I/O error; a read-only node fails only deletes.
pub struct InMemoryNode {
    addr: String,
    store: Mutex<BTreeMap<String, Vec<u8>>>,
    unreachable: bool,
    read_only: bool,
}

impl InMemoryNode {
    pub fn new(addr: &str) -> Self {
        InMemoryNode {
            addr: addr.to_string(),
            store: Mutex::new(BTreeMap::new()),
            unreachable: false,
            read_only: false,
        }
    }

    pub fn read_only(addr: &str) -> Self {
        InMemoryNode {
            read_only: true,
            ..InMemoryNode::new(addr)
        }
    }

    pub fn unreachable(addr: &str) -> Self {
        InMemoryNode {
            unreachable: true,
            ..InMemoryNode::new(addr)
        }
    }

    pub fn with<V: Into<Vec<u8>>>(self, key: &str, value: V) -> Self {
        self.store
            .lock()
            .unwrap()
            .insert(key.to_string(), value.into());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.lock().unwrap().contains_key(key)
    }

    fn check_reachable(&self) -> Result<(), CacheError> {
        if self.unreachable {
            return Err(CacheError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheNode for InMemoryNode {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>, CacheError> {
        self.check_reachable()?;
        let items = self.store.lock().unwrap().len() as u64;
        Ok(vec![Bucket { id: 1, items }])
    }

    async fn list_keys(&self, _bucket: u32) -> Result<Vec<String>, CacheError> {
        self.check_reachable()?;
        Ok(self.store.lock().unwrap().keys().cloned().collect())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        self.check_reachable()?;
        self.store
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(CacheError::NotFound)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check_reachable()?;
        if self.read_only {
            return Err(CacheError::Server("SERVER_ERROR read only".into()));
        }
        self.store
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or(CacheError::NotFound)
    }
}
