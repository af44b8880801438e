//! Interaction containers, the per-user interaction-set snapshot, and
//! sampled training triplets.
use std::hash::Hasher;

use rand::seq::SliceRandom;
use rand::Rng;

use siphasher::sip::SipHasher;

use super::{ItemId, UserId};

/// A single observed (user, item) interaction.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub struct Interaction {
    user_id: UserId,
    item_id: ItemId,
}

impl Interaction {
    /// Create a new interaction.
    pub fn new(user_id: UserId, item_id: ItemId) -> Self {
        Interaction { user_id, item_id }
    }

    /// The user id.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The item id.
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }
}

/// Split interactions into train and test sets.
///
/// Every (user, item) pair is hashed with randomly keyed SipHash, so the
/// assignment does not depend on the order of `interactions`. Both halves
/// keep the shape of the input.
pub fn train_test_split<R: Rng>(
    interactions: &Interactions,
    rng: &mut R,
    test_fraction: f32,
) -> (Interactions, Interactions) {
    let denominator = 100_000;
    let test_cutoff = (test_fraction * denominator as f32) as u64;

    let (key_0, key_1) = (rng.gen::<u64>(), rng.gen::<u64>());

    let is_train = |x: &Interaction| {
        let mut hasher = SipHasher::new_with_keys(key_0, key_1);
        hasher.write_usize(x.user_id());
        hasher.write_usize(x.item_id());
        hasher.finish() % denominator >= test_cutoff
    };

    interactions.split_by(is_train)
}

/// A list of interactions together with the declared number of users and items.
///
/// The declared shape always covers every contained interaction.
#[derive(Clone, Debug)]
pub struct Interactions {
    num_users: usize,
    num_items: usize,
    interactions: Vec<Interaction>,
}

impl Interactions {
    /// Create an empty set of interactions with the given shape.
    pub fn new(num_users: usize, num_items: usize) -> Self {
        Interactions {
            num_users,
            num_items,
            interactions: Vec::new(),
        }
    }

    /// Add an interaction, growing the shape if necessary.
    ///
    /// The shape saturates at `usize::MAX`, so an id of `usize::MAX` is never
    /// covered and is rejected when the graph is built.
    pub fn push(&mut self, interaction: Interaction) {
        self.num_users = self.num_users.max(interaction.user_id().saturating_add(1));
        self.num_items = self.num_items.max(interaction.item_id().saturating_add(1));
        self.interactions.push(interaction);
    }

    /// Grow the declared shape to at least `num_users` by `num_items`.
    pub fn expand_shape(&mut self, num_users: usize, num_items: usize) {
        self.num_users = self.num_users.max(num_users);
        self.num_items = self.num_items.max(num_items);
    }

    /// The raw interactions.
    pub fn data(&self) -> &[Interaction] {
        &self.interactions
    }

    /// Number of interactions.
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether there are no interactions.
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Shuffle the interactions in place.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        self.interactions.shuffle(rng);
    }

    /// Split into the interactions that satisfy `func` and those that don't.
    pub fn split_by<F: Fn(&Interaction) -> bool>(&self, func: F) -> (Self, Self) {
        let (head, tail): (Vec<Interaction>, Vec<Interaction>) =
            self.interactions.iter().cloned().partition(|x| func(x));

        (
            Interactions {
                num_users: self.num_users,
                num_items: self.num_items,
                interactions: head,
            },
            Interactions {
                num_users: self.num_users,
                num_items: self.num_items,
                interactions: tail,
            },
        )
    }

    /// Build the per-user interaction-set snapshot.
    pub fn to_compressed(&self) -> CompressedInteractions {
        CompressedInteractions::from(self)
    }

    /// Number of users.
    pub fn num_users(&self) -> usize {
        self.num_users
    }

    /// Number of items.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Shape as `(num_users, num_items)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.num_users, self.num_items)
    }
}

impl From<Vec<Interaction>> for Interactions {
    fn from(data: Vec<Interaction>) -> Interactions {
        let num_users = data
            .iter()
            .map(|x| x.user_id().saturating_add(1))
            .max()
            .unwrap_or(0);
        let num_items = data
            .iter()
            .map(|x| x.item_id().saturating_add(1))
            .max()
            .unwrap_or(0);

        Interactions {
            num_users,
            num_items,
            interactions: data,
        }
    }
}

/// Per-user interaction sets in compressed sparse row layout.
///
/// Each user's item ids are sorted and unique. The structure is immutable
/// once built.
#[derive(Clone, Debug)]
pub struct CompressedInteractions {
    num_users: usize,
    num_items: usize,
    user_pointers: Vec<usize>,
    item_ids: Vec<ItemId>,
}

impl<'a> From<&'a Interactions> for CompressedInteractions {
    fn from(interactions: &Interactions) -> CompressedInteractions {
        let mut data: Vec<(UserId, ItemId)> = interactions
            .data()
            .iter()
            .map(|x| (x.user_id(), x.item_id()))
            .collect();

        data.sort_unstable();
        data.dedup();

        let mut user_pointers = vec![0; interactions.num_users + 1];
        let mut item_ids = Vec::with_capacity(data.len());

        for &(user_id, item_id) in &data {
            item_ids.push(item_id);
            user_pointers[user_id + 1] += 1;
        }

        for idx in 1..user_pointers.len() {
            user_pointers[idx] += user_pointers[idx - 1];
        }

        CompressedInteractions {
            num_users: interactions.num_users,
            num_items: interactions.num_items,
            user_pointers,
            item_ids,
        }
    }
}

impl CompressedInteractions {
    /// Iterate over all users, including those without interactions.
    pub fn iter_users(&self) -> CompressedInteractionsUserIterator {
        CompressedInteractionsUserIterator {
            interactions: self,
            idx: 0,
        }
    }

    /// Get a single user's interactions.
    pub fn get_user(&self, user_id: UserId) -> Option<CompressedInteractionsUser> {
        if user_id >= self.num_users {
            return None;
        }

        let start = self.user_pointers[user_id];
        let stop = self.user_pointers[user_id + 1];

        Some(CompressedInteractionsUser {
            user_id,
            item_ids: &self.item_ids[start..stop],
        })
    }

    /// Total number of distinct (user, item) pairs.
    pub fn nnz(&self) -> usize {
        self.item_ids.len()
    }

    /// Number of users.
    pub fn num_users(&self) -> usize {
        self.num_users
    }

    /// Number of items.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Shape as `(num_users, num_items)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.num_users, self.num_items)
    }
}

/// Iterator over the users of a [`CompressedInteractions`].
pub struct CompressedInteractionsUserIterator<'a> {
    interactions: &'a CompressedInteractions,
    idx: usize,
}

/// A single user's sorted, unique item ids.
#[derive(Debug, Clone, Copy)]
pub struct CompressedInteractionsUser<'a> {
    /// The user id.
    pub user_id: UserId,
    /// Sorted, unique item ids.
    pub item_ids: &'a [ItemId],
}

impl<'a> CompressedInteractionsUser<'a> {
    /// Number of items the user interacted with.
    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    /// Whether the user has no interactions.
    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    /// Whether the user interacted with `item_id`.
    pub fn contains(&self, item_id: ItemId) -> bool {
        self.item_ids.binary_search(&item_id).is_ok()
    }
}

impl<'a> Iterator for CompressedInteractionsUserIterator<'a> {
    type Item = CompressedInteractionsUser<'a>;
    fn next(&mut self) -> Option<Self::Item> {
        let value = self.interactions.get_user(self.idx);
        self.idx += 1;

        value
    }
}

/// Columnar (user, positive item, negative item) training samples.
#[derive(Clone, Debug, Default)]
pub struct Triplets {
    user_ids: Vec<UserId>,
    positive_item_ids: Vec<ItemId>,
    negative_item_ids: Vec<ItemId>,
}

impl Triplets {
    /// Create an empty triplet set with room for `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        Triplets {
            user_ids: Vec::with_capacity(capacity),
            positive_item_ids: Vec::with_capacity(capacity),
            negative_item_ids: Vec::with_capacity(capacity),
        }
    }

    /// Append a sample.
    pub fn push(&mut self, user_id: UserId, positive_item_id: ItemId, negative_item_id: ItemId) {
        self.user_ids.push(user_id);
        self.positive_item_ids.push(positive_item_id);
        self.negative_item_ids.push(negative_item_id);
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.user_ids.len()
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }

    /// Get the `idx`-th sample.
    pub fn get(&self, idx: usize) -> Option<(UserId, ItemId, ItemId)> {
        if idx >= self.len() {
            return None;
        }

        Some((
            self.user_ids[idx],
            self.positive_item_ids[idx],
            self.negative_item_ids[idx],
        ))
    }

    /// Shuffle the samples, keeping each triplet together.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        let mut permutation: Vec<usize> = (0..self.len()).collect();
        permutation.shuffle(rng);

        self.user_ids = permutation.iter().map(|&idx| self.user_ids[idx]).collect();
        self.positive_item_ids = permutation
            .iter()
            .map(|&idx| self.positive_item_ids[idx])
            .collect();
        self.negative_item_ids = permutation
            .iter()
            .map(|&idx| self.negative_item_ids[idx])
            .collect();
    }

    /// Number of minibatches of size `minibatch_size`, counting a final partial one.
    pub fn num_minibatches(&self, minibatch_size: usize) -> usize {
        (self.len() + minibatch_size - 1) / minibatch_size
    }

    /// Iterate over contiguous minibatches. The last one may be shorter.
    pub fn iter_minibatch(&self, minibatch_size: usize) -> TripletMinibatchIterator {
        TripletMinibatchIterator {
            triplets: self,
            idx: 0,
            minibatch_size: minibatch_size.max(1),
        }
    }
}

/// Iterator over contiguous minibatches of [`Triplets`].
#[derive(Clone, Debug)]
pub struct TripletMinibatchIterator<'a> {
    triplets: &'a Triplets,
    idx: usize,
    minibatch_size: usize,
}

/// A borrowed minibatch of training samples.
#[derive(Debug, Clone, Copy)]
pub struct TripletMinibatch<'a> {
    /// User ids.
    pub user_ids: &'a [UserId],
    /// Observed item ids.
    pub positive_item_ids: &'a [ItemId],
    /// Unobserved item ids.
    pub negative_item_ids: &'a [ItemId],
}

impl<'a> TripletMinibatch<'a> {
    /// Number of samples in the minibatch.
    pub fn len(&self) -> usize {
        self.user_ids.len()
    }

    /// Whether the minibatch is empty.
    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }
}

impl<'a> Iterator for TripletMinibatchIterator<'a> {
    type Item = TripletMinibatch<'a>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.triplets.len() {
            return None;
        }

        let start = self.idx;
        let stop = (self.idx + self.minibatch_size).min(self.triplets.len());
        self.idx = stop;

        Some(TripletMinibatch {
            user_ids: &self.triplets.user_ids[start..stop],
            positive_item_ids: &self.triplets.positive_item_ids[start..stop],
            negative_item_ids: &self.triplets.negative_item_ids[start..stop],
        })
    }
}
