//! Exclusively owned resources that move between the two sides of a port.
//!
//! A transfer moves a value instead of copying it: once a [`Transferable`]
//! is handed to a sending call it is gone from the caller, and the receiving
//! handler (or the awaiting requester) becomes its only owner.

use std::fmt;

use bytes::BytesMut;

use super::Port;

/// A resource whose ownership can be moved to the peer.
pub enum Transferable {
    /// A mutable byte buffer.
    Buffer(BytesMut),
    /// One end of another channel.
    Port(Port),
}

impl Transferable {
    /// Take the buffer out, if this is one.
    pub fn into_buffer(self) -> Option<BytesMut> {
        match self {
            Transferable::Buffer(buf) => Some(buf),
            Transferable::Port(_) => None,
        }
    }

    /// Take the port out, if this is one.
    pub fn into_port(self) -> Option<Port> {
        match self {
            Transferable::Port(port) => Some(port),
            Transferable::Buffer(_) => None,
        }
    }

    /// Whether this resource is a port.
    pub fn is_port(&self) -> bool {
        matches!(self, Transferable::Port(_))
    }
}

impl fmt::Debug for Transferable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transferable::Buffer(buf) => f.debug_tuple("Buffer").field(&buf.len()).finish(),
            Transferable::Port(port) => f.debug_tuple("Port").field(port).finish(),
        }
    }
}

impl From<BytesMut> for Transferable {
    fn from(buf: BytesMut) -> Self {
        Transferable::Buffer(buf)
    }
}

impl From<Vec<u8>> for Transferable {
    fn from(buf: Vec<u8>) -> Self {
        Transferable::Buffer(BytesMut::from(&buf[..]))
    }
}

impl From<Port> for Transferable {
    fn from(port: Port) -> Self {
        Transferable::Port(port)
    }
}

/// One resource or many, always carried as a list.
#[derive(Debug, Default)]
pub struct TransferList(Vec<Transferable>);

impl TransferList {
    /// Empty list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a resource.
    pub fn push(&mut self, item: impl Into<Transferable>) {
        self.0.push(item.into());
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unwrap into the underlying vector.
    pub fn into_vec(self) -> Vec<Transferable> {
        self.0
    }
}

impl From<Transferable> for TransferList {
    fn from(item: Transferable) -> Self {
        Self(vec![item])
    }
}

impl From<BytesMut> for TransferList {
    fn from(buf: BytesMut) -> Self {
        Self(vec![Transferable::Buffer(buf)])
    }
}

impl From<Port> for TransferList {
    fn from(port: Port) -> Self {
        Self(vec![Transferable::Port(port)])
    }
}

impl<T: Into<Transferable>> From<Vec<T>> for TransferList {
    fn from(items: Vec<T>) -> Self {
        Self(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Transferable>> From<Option<T>> for TransferList {
    fn from(item: Option<T>) -> Self {
        Self(item.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for TransferList {
    type Item = Transferable;
    type IntoIter = std::vec::IntoIter<Transferable>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<Transferable> for TransferList {
    fn from_iter<I: IntoIterator<Item = Transferable>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_resource_normalized_to_list() {
        let list = TransferList::from(BytesMut::from(&b"abc"[..]));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_vec_of_buffers() {
        let list = TransferList::from(vec![
            BytesMut::from(&b"a"[..]),
            BytesMut::from(&b"b"[..]),
        ]);
        let items = list.into_vec();

        assert_eq!(items.len(), 2);
        assert_eq!(&items[1].as_buffer_for_test()[..], b"b");
    }

    #[test]
    fn test_none_is_empty() {
        let list = TransferList::from(None::<BytesMut>);
        assert!(list.is_empty());
    }

    #[test]
    fn test_port_resource() {
        let (a, _b) = Port::pair();
        let item = Transferable::from(a);

        assert!(item.is_port());
        assert!(item.into_buffer().is_none());
    }

    impl Transferable {
        fn as_buffer_for_test(&self) -> &BytesMut {
            match self {
                Transferable::Buffer(buf) => buf,
                Transferable::Port(_) => panic!("not a buffer"),
            }
        }
    }
}
