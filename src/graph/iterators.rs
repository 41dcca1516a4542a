use crate::error::YakDbError;
use crate::graph::attributes::BasicAttributes;
use crate::graph::edge::EDGE_TYPE_SEPARATOR;
use crate::graph::node::Node;
use crate::iterators::KeyValueIterator;
use crate::transport::TransportContext;

/// Lazy iterator over the nodes of a graph. Edge records sharing the
/// node table are skipped transparently.
pub struct NodeIterator<'a, C: TransportContext> {
    inner: KeyValueIterator<'a, C>,
}

impl<'a, C: TransportContext> NodeIterator<'a, C> {
    pub(crate) fn new(inner: KeyValueIterator<'a, C>) -> Self {
        NodeIterator { inner }
    }
}

impl<C: TransportContext> Iterator for NodeIterator<'_, C> {
    type Item = Result<Node, YakDbError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, value) = match self.inner.next()? {
                Ok(record) => record,
                Err(error) => return Some(Err(error)),
            };
            if key.contains(&EDGE_TYPE_SEPARATOR) {
                continue;
            }
            return Some(BasicAttributes::parse(&value).map(|basic_attributes| Node {
                id: key,
                basic_attributes,
            }));
        }
    }
}
