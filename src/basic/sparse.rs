pub(crate) mod cast;
pub(crate) mod conj;
pub(crate) mod slice;
pub(crate) mod stack;
