use std::sync::Mutex;

use chrono::Utc;
use rand::Rng;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const RANDOM_LEN: usize = 12;
const TIMESTAMP_LEN: usize = 8;

/// Generates chronologically ordered, 20-character child keys.
///
/// Keys produced within the same millisecond increment the random suffix, so
/// every key from one generator is unique and sorts after the previous one.
#[derive(Debug, Default)]
pub struct PushIdGenerator {
    state: Mutex<PushState>,
}

#[derive(Debug, Default)]
struct PushState {
    last_push_time: u64,
    last_rand_chars: [u8; RANDOM_LEN],
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        self.next_id_at(now)
    }

    pub(crate) fn next_id_at(&self, now: u64) -> String {
        let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
        // A clock step backwards is treated like a repeat of the last instant.
        let now = now.max(state.last_push_time);
        let duplicate_time = now == state.last_push_time;
        state.last_push_time = now;

        if duplicate_time {
            increment_suffix(&mut state.last_rand_chars);
        } else {
            let mut rng = rand::thread_rng();
            for slot in state.last_rand_chars.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        }

        let mut id = String::with_capacity(TIMESTAMP_LEN + RANDOM_LEN);
        id.extend(encode_timestamp(now).iter().map(|&ch| ch as char));
        id.extend(
            state
                .last_rand_chars
                .iter()
                .map(|&index| PUSH_CHARS[index as usize] as char),
        );
        id
    }
}

fn encode_timestamp(mut now: u64) -> [u8; TIMESTAMP_LEN] {
    let mut chars = [0u8; TIMESTAMP_LEN];
    for slot in chars.iter_mut().rev() {
        *slot = PUSH_CHARS[(now % 64) as usize];
        now /= 64;
    }
    chars
}

fn increment_suffix(suffix: &mut [u8; RANDOM_LEN]) {
    for slot in suffix.iter_mut().rev() {
        if *slot == 63 {
            *slot = 0;
        } else {
            *slot += 1;
            return;
        }
    }
}
