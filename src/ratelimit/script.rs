//! Server-side check-and-increment script.
//!
//! `KEYS[1]` is the counter key, `ARGV[1]` the quota and `ARGV[2]` the window
//! in milliseconds. Returns `0` when the request is admitted, otherwise the
//! counter's remaining time-to-live in milliseconds, at least `1` so a denial
//! is never read as an admit. Redis runs the whole
//! script atomically, so concurrent callers on the same key are serialized.

pub const CHECK_SCRIPT: &str = r#"local key = KEYS[1]
local limit = tonumber(ARGV[1])
local expire_time = ARGV[2]

local current = tonumber(redis.call('GET', key) or "0")
if current > 0 then
    if current + 1 > limit then
        local ttl = redis.call('PTTL', key)
        if ttl == 0 then
            return 1
        end
        return ttl
    else
        redis.call('INCR', key)
        return 0
    end
else
    redis.call('SET', key, 1, 'PX', expire_time)
    return 0
end
"#;
