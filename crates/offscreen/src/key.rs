use std::marker::PhantomData;

#[derive(Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Id<Tag, Repr> {
    raw: Repr,
    _marker: PhantomData<Tag>,
}

impl<Tag, Repr: Copy> Copy for Id<Tag, Repr> {}

impl<Tag, Repr: Copy> Clone for Id<Tag, Repr> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Tag, Repr> Id<Tag, Repr> {
    pub(crate) const fn new(raw: Repr) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub(crate) const fn raw(self) -> Repr
    where
        Repr: Copy,
    {
        self.raw
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub enum BucketTag {}

/// Arena slot of one bucket. Slots are recycled after a bucket is merged away.
pub type BucketId = Id<BucketTag, u32>;

impl BucketId {
    pub(crate) const fn index(self) -> usize {
        self.raw() as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        let raw = u32::try_from(index).expect("bucket arena index exceeds u32");
        Self::new(raw)
    }
}

/// Bucket zero always describes the primary surface that precedes the pool.
pub(crate) const PRIMARY_BUCKET: BucketId = BucketId::new(0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_id_round_trips_arena_index() {
        let id = BucketId::from_index(17);
        assert_eq!(id.index(), 17);
        assert_eq!(id.raw(), 17);
        assert_eq!(PRIMARY_BUCKET.index(), 0);
    }

    #[test]
    fn ids_compare_by_raw_value() {
        assert_eq!(BucketId::new(3), BucketId::from_index(3));
        assert_ne!(BucketId::new(3), BucketId::new(4));
    }
}
