//! One (user, positive, negative) triplet per user per epoch.
use rand::Rng;
use tracing::debug;

use crate::data::{CompressedInteractions, Triplets};
use crate::{ItemId, UserId};

/// Draw a uniformly random item the user has not interacted with.
///
/// `observed` must be sorted, unique, and a strict subset of `0..num_items`.
fn sample_negative<R: Rng>(observed: &[ItemId], num_items: usize, rng: &mut R) -> ItemId {
    if observed.len() * 2 <= num_items {
        // Sparse users: rejection sampling is uniform over the complement and
        // accepts at least half the time.
        loop {
            let candidate = rng.gen_range(0..num_items);

            if observed.binary_search(&candidate).is_err() {
                return candidate;
            }
        }
    }

    // Dense users: pick the n-th unobserved item directly.
    let mut remaining = rng.gen_range(0..num_items - observed.len());
    let mut observed = observed.iter().peekable();

    for item_id in 0..num_items {
        if observed.peek() == Some(&&item_id) {
            observed.next();
            continue;
        }

        if remaining == 0 {
            return item_id;
        }
        remaining -= 1;
    }

    unreachable!("Negative pool is non-empty")
}

/// Sample triplets for `users`, in the order given.
///
/// Users with no interactions, or who interacted with every item, are
/// skipped; the returned set is correspondingly smaller.
pub fn sample_triplets<R: Rng>(
    interactions: &CompressedInteractions,
    users: &[UserId],
    rng: &mut R,
) -> Triplets {
    let num_items = interactions.num_items();
    let mut triplets = Triplets::with_capacity(users.len());
    let mut skipped = 0;

    for &user_id in users {
        let user = match interactions.get_user(user_id) {
            Some(user) if !user.is_empty() && user.len() < num_items => user,
            _ => {
                skipped += 1;
                continue;
            }
        };

        let positive = user.item_ids[rng.gen_range(0..user.len())];
        let negative = sample_negative(user.item_ids, num_items, rng);

        triplets.push(user_id, positive, negative);
    }

    if skipped > 0 {
        debug!(skipped, sampled = triplets.len(), "Skipped degenerate users");
    }

    triplets
}
