use std::fmt;

/// Number of bits used for the slot index; the generation takes the other half.
const HALF_BITS: u32 = usize::BITS / 2;
const INDEX_MASK: usize = (1usize << HALF_BITS) - 1;

/// Largest slot index a handle can address.
pub const MAX_INDEX: usize = INDEX_MASK - 1;

/// A pointer-sized, copyable handle into a [`HandleTable`](crate::HandleTable).
///
/// Layout: the low half of the word stores `index + 1`, the high half stores the
/// slot generation. Because the index part is never zero for a live slot, the
/// all-zero bit pattern is free to act as the "invalid" sentinel.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RawHandle(usize);

impl RawHandle {
    /// The reserved sentinel. Never returned by a table.
    pub const INVALID: RawHandle = RawHandle(0);

    pub(crate) fn new(index: usize, generation: u32) -> Self {
        debug_assert!(index <= MAX_INDEX, "handle index {} out of range", index);
        let generation = (generation as usize) & INDEX_MASK;
        RawHandle((generation << HALF_BITS) | (index + 1))
    }

    /// Reinterprets bits that crossed an FFI boundary. No validation happens here;
    /// tables check the index and generation on lookup.
    pub const fn from_bits(bits: usize) -> Self {
        RawHandle(bits)
    }

    pub const fn to_bits(self) -> usize {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Slot index, or `None` for the sentinel.
    pub fn index(self) -> Option<usize> {
        let low = self.0 & INDEX_MASK;
        if low == 0 {
            None
        } else {
            Some(low - 1)
        }
    }

    pub fn generation(self) -> u32 {
        (self.0 >> HALF_BITS) as u32
    }

    /// Masks a full generation counter down to what fits in a handle.
    pub(crate) fn truncate_generation(generation: u32) -> u32 {
        ((generation as usize) & INDEX_MASK) as u32
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(index) => write!(f, "#{}v{}", index, self.generation()),
            None => write!(f, "#invalid"),
        }
    }
}

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(RawHandle);

        impl $name {
            pub const INVALID: $name = $name(RawHandle::INVALID);

            pub const fn from_raw(raw: RawHandle) -> Self {
                $name(raw)
            }

            pub const fn raw(self) -> RawHandle {
                self.0
            }

            pub const fn from_bits(bits: usize) -> Self {
                $name(RawHandle::from_bits(bits))
            }

            pub const fn to_bits(self) -> usize {
                self.0.to_bits()
            }

            pub const fn is_valid(self) -> bool {
                self.0.is_valid()
            }
        }

        impl From<RawHandle> for $name {
            fn from(raw: RawHandle) -> Self {
                $name(raw)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:?})"), self.0)
            }
        }
    };
}

typed_handle!(
    /// Opaque reference to a loaded type, generic or not, specialized or not.
    TypeRef
);

typed_handle!(
    /// Opaque reference to a loaded or specialized method.
    FuncRef
);
