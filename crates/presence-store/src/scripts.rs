//! Server-side Lua scripts backing the connection store's multi-key
//! mutations, written fresh against the intended behavior rather than
//! copied from any prior implementation.

use redis::Script;

/// `KEYS = [conn_key]`, `ARGV = [ttl_secs, user_id, conn_id, device, now_ms]`.
/// Writes the connection hash, sets its TTL, adds `conn_id` to the user's
/// connection set, and refreshes that set's TTL to match.
pub fn add_connection() -> Script {
    Script::new(
        r#"
        local conn_key = KEYS[1]
        local ttl = tonumber(ARGV[1])
        local user_id = ARGV[2]
        local conn_id = ARGV[3]
        local device = ARGV[4]
        local now = ARGV[5]
        local user_set_key = 'user:' .. user_id .. ':conns'

        redis.call('HSET', conn_key,
            'user_id', user_id,
            'conn_id', conn_id,
            'device', device,
            'connected_at_ms', now,
            'last_activity_ms', now)
        redis.call('EXPIRE', conn_key, ttl)
        redis.call('SADD', user_set_key, conn_id)
        redis.call('EXPIRE', user_set_key, ttl)
        return 1
        "#,
    )
}

/// `KEYS = [conn_key]`, `ARGV = [user_id, conn_id]`.
/// Idempotent: removing an absent connection is a no-op.
pub fn remove_connection() -> Script {
    Script::new(
        r#"
        local conn_key = KEYS[1]
        local user_id = ARGV[1]
        local conn_id = ARGV[2]
        local user_set_key = 'user:' .. user_id .. ':conns'

        redis.call('DEL', conn_key)
        redis.call('SREM', user_set_key, conn_id)
        if redis.call('SCARD', user_set_key) == 0 then
            redis.call('DEL', user_set_key)
        end
        return 1
        "#,
    )
}

/// `KEYS = [conn_key]`, `ARGV = [ttl_secs, now_ms]`.
/// Returns 0 (not-found) without recreating the record if it had already
/// expired — the caller must treat that as a zombie heartbeat, never a
/// silent resurrection.
pub fn touch_connection() -> Script {
    Script::new(
        r#"
        local conn_key = KEYS[1]
        local ttl = tonumber(ARGV[1])
        local now = ARGV[2]

        local user_id = redis.call('HGET', conn_key, 'user_id')
        if not user_id then
            return 0
        end
        redis.call('HSET', conn_key, 'last_activity_ms', now)
        redis.call('EXPIRE', conn_key, ttl)
        redis.call('EXPIRE', 'user:' .. user_id .. ':conns', ttl)
        return 1
        "#,
    )
}

/// `KEYS = [user_set_key]`. Removes any connection id from the user's set
/// whose backing hash has already expired. Returns the number removed.
pub fn cleanup_dangling() -> Script {
    Script::new(
        r#"
        local user_set_key = KEYS[1]
        local ids = redis.call('SMEMBERS', user_set_key)
        local removed = 0
        for _, id in ipairs(ids) do
            if redis.call('EXISTS', 'conn:' .. id) == 0 then
                redis.call('SREM', user_set_key, id)
                removed = removed + 1
            end
        end
        if redis.call('SCARD', user_set_key) == 0 then
            redis.call('DEL', user_set_key)
        end
        return removed
        "#,
    )
}
