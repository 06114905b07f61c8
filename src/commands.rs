//! Convenience data-structure operations.
//!
//! Thin wrappers over [`Connection::execute`] that lay out arguments and
//! unwrap the reply into a Rust value. Single-value accessors report an
//! absent reply as [`KvError::NotFound`], never as an empty string.

use crate::command::Command;
use crate::connection::Connection;
use crate::error::{KvError, Result};

impl Connection {
    /// Round-trip a `PING`; returns the server's status text.
    pub fn ping(&mut self) -> Result<String> {
        let mut cmd = Command::new("PING");
        self.execute(&mut cmd)?;
        Ok(cmd.message().to_string())
    }

    // ── Strings / keys ─────────────────────────────────────────────

    /// Fetch a string value. A missing key is [`KvError::NotFound`].
    pub fn get(&mut self, key: &str) -> Result<String> {
        self.single(Command::new("GET").arg(key))
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.set_with_ttl(key, value, 0)
    }

    /// Store `value` expiring after `ttl_secs`; a non-positive TTL stores it
    /// without expiry.
    pub fn set_with_ttl(&mut self, key: &str, value: &str, ttl_secs: i64) -> Result<()> {
        self.execute(&mut set_command(key, value, ttl_secs))?;
        Ok(())
    }

    /// Delete `key`. Returns whether it existed.
    pub fn del(&mut self, key: &str) -> Result<bool> {
        Ok(self.integer(Command::new("DEL").arg(key))? > 0)
    }

    /// Remaining time to live in seconds (`-1` no expiry, `-2` no key).
    pub fn ttl(&mut self, key: &str) -> Result<i64> {
        self.integer(Command::new("TTL").arg(key))
    }

    /// Set a timeout on `key`. Returns whether the key exists.
    pub fn expire(&mut self, key: &str, secs: i64) -> Result<bool> {
        Ok(self.integer(Command::new("EXPIRE").arg(key).arg(secs))? == 1)
    }

    /// Add `by` to the integer at `key`; returns the new value.
    pub fn incr(&mut self, key: &str, by: i64) -> Result<i64> {
        self.integer(Command::new("INCRBY").arg(key).arg(by))
    }

    /// Subtract `by` from the integer at `key`; returns the new value.
    pub fn decr(&mut self, key: &str, by: i64) -> Result<i64> {
        self.integer(Command::new("DECRBY").arg(key).arg(by))
    }

    /// Keys matching a glob-style `pattern`.
    pub fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.list(Command::new("KEYS").arg(pattern))
    }

    // ── Hashes ─────────────────────────────────────────────────────

    pub fn hget(&mut self, key: &str, field: &str) -> Result<String> {
        self.single(Command::new("HGET").arg(key).arg(field))
    }

    /// Set a hash field. Returns `true` when the field is new.
    pub fn hset(&mut self, key: &str, field: &str, value: &str) -> Result<bool> {
        Ok(self.integer(Command::new("HSET").arg(key).arg(field).arg(value))? > 0)
    }

    /// Remove a hash field. Returns whether it existed.
    pub fn hdel(&mut self, key: &str, field: &str) -> Result<bool> {
        Ok(self.integer(Command::new("HDEL").arg(key).arg(field))? > 0)
    }

    pub fn hlen(&mut self, key: &str) -> Result<i64> {
        self.integer(Command::new("HLEN").arg(key))
    }

    // ── Lists ──────────────────────────────────────────────────────

    /// Prepend; returns the list length after the push.
    pub fn lpush(&mut self, key: &str, value: &str) -> Result<i64> {
        self.integer(Command::new("LPUSH").arg(key).arg(value))
    }

    /// Append; returns the list length after the push.
    pub fn rpush(&mut self, key: &str, value: &str) -> Result<i64> {
        self.integer(Command::new("RPUSH").arg(key).arg(value))
    }

    /// Queue-style append, same as [`rpush`](Self::rpush).
    pub fn push(&mut self, key: &str, value: &str) -> Result<i64> {
        self.rpush(key, value)
    }

    pub fn lpop(&mut self, key: &str) -> Result<String> {
        self.single(Command::new("LPOP").arg(key))
    }

    pub fn rpop(&mut self, key: &str) -> Result<String> {
        self.single(Command::new("RPOP").arg(key))
    }

    /// Queue-style take, same as [`lpop`](Self::lpop).
    pub fn pop(&mut self, key: &str) -> Result<String> {
        self.lpop(key)
    }

    pub fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.list(Command::new("LRANGE").arg(key).arg(start).arg(stop))
    }

    // ── Sorted sets ────────────────────────────────────────────────

    /// Add `member` with `score`. Returns the number of new members.
    pub fn zadd(&mut self, key: &str, member: &str, score: f64) -> Result<i64> {
        self.integer(zadd_command(key, member, score))
    }

    pub fn zrem(&mut self, key: &str, member: &str) -> Result<bool> {
        Ok(self.integer(Command::new("ZREM").arg(key).arg(member))? > 0)
    }

    /// Members by rank. With `with_scores` the list alternates member, score.
    pub fn zrange(
        &mut self,
        key: &str,
        start: i64,
        stop: i64,
        with_scores: bool,
    ) -> Result<Vec<String>> {
        self.list(zrange_command(key, start, stop, with_scores))
    }

    // ── Scripting ──────────────────────────────────────────────────

    /// Evaluate a server-side script and hand back the populated command.
    ///
    /// Integer results land in [`Command::status`], strings and arrays in
    /// [`Command::results`].
    pub fn eval<K, A>(&mut self, script: &str, keys: K, args: A) -> Result<Command>
    where
        K: IntoIterator,
        K::Item: ToString,
        A: IntoIterator,
        A::Item: ToString,
    {
        let mut cmd = eval_command(script, keys, args);
        self.execute(&mut cmd)?;
        Ok(cmd)
    }

    // ── Reply shapes ───────────────────────────────────────────────

    fn integer(&mut self, mut cmd: Command) -> Result<i64> {
        self.execute(&mut cmd)?;
        Ok(cmd.status())
    }

    fn single(&mut self, mut cmd: Command) -> Result<String> {
        self.execute(&mut cmd)?;
        cmd.into_results().into_iter().next().ok_or(KvError::NotFound)
    }

    fn list(&mut self, mut cmd: Command) -> Result<Vec<String>> {
        self.execute(&mut cmd)?;
        Ok(cmd.into_results())
    }
}

fn set_command(key: &str, value: &str, ttl_secs: i64) -> Command {
    if ttl_secs > 0 {
        Command::new("SETEX").arg(key).arg(ttl_secs).arg(value)
    } else {
        Command::new("SET").arg(key).arg(value)
    }
}

fn zadd_command(key: &str, member: &str, score: f64) -> Command {
    Command::new("ZADD").arg(key).arg(score).arg(member)
}

fn zrange_command(key: &str, start: i64, stop: i64, with_scores: bool) -> Command {
    let cmd = Command::new("ZRANGE").arg(key).arg(start).arg(stop);
    if with_scores {
        cmd.arg("WITHSCORES")
    } else {
        cmd
    }
}

/// `EVAL script numkeys key… arg…`
fn eval_command<K, A>(script: &str, keys: K, args: A) -> Command
where
    K: IntoIterator,
    K::Item: ToString,
    A: IntoIterator,
    A::Item: ToString,
{
    let keys: Vec<String> = keys.into_iter().map(|k| k.to_string()).collect();
    let mut cmd = Command::new("EVAL");
    cmd.add(script).add(keys.len()).add_all(keys).add_all(args);
    cmd
}

// ── Tests ──────────────────────────────────────────────────────────
