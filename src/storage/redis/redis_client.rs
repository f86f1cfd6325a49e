use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::common::error::Result;

// KEYS[1] = entry, ARGV[1] = field, ARGV[2] = expected, ARGV[3] = replacement.
// Returns -1 when the entry is missing, 0 on mismatch, 1 once swapped.
const COMPARE_AND_SWAP: &str = r#"
local current = redis.call('HGET', KEYS[1], ARGV[1])
if not current then return -1 end
if current ~= ARGV[2] then return 0 end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
return 1
"#;

// KEYS[1] = entry, ARGV = field/value pairs. Returns 0 if the entry exists.
const CREATE_IF_ABSENT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then return 0 end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
"#;

#[derive(Clone)]
pub struct RedisClient {
    conn: Arc<Mutex<MultiplexedConnection>>,
}

impl RedisClient {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.lock().await;
        let values: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(values)
    }

    pub async fn compare_and_swap_field(
        &self,
        key: &str,
        field: &str,
        expected: &str,
        replacement: &str,
    ) -> Result<i64> {
        let mut conn = self.conn.lock().await;
        let outcome: i64 = redis::Script::new(COMPARE_AND_SWAP)
            .key(key)
            .arg(field)
            .arg(expected)
            .arg(replacement)
            .invoke_async(&mut *conn)
            .await?;
        log::debug!("compare-and-swap on {} returned {}", key, outcome);
        Ok(outcome)
    }

    pub async fn create_hash_if_absent(
        &self,
        key: &str,
        fields: &[(&str, &str)],
    ) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let script = redis::Script::new(CREATE_IF_ABSENT);
        let mut invocation = script.prepare_invoke();
        invocation.key(key);
        for (field, value) in fields {
            invocation.arg(*field).arg(*value);
        }
        let created: i64 = invocation.invoke_async(&mut *conn).await?;
        Ok(created == 1)
    }
}
