use crate::error::{StoreError, StoreResult};
use crate::model::{AddressLabel, GraphStats, TransactionRecord};
use crate::store::{GraphSession, GraphStore};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum Node {
    Address {
        address: String,
        labels: BTreeSet<AddressLabel>,
        tag: Option<String>,
        category: Option<String>,
    },
    Transaction(TransactionRecord),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Edge {
    /// address -> transaction
    InputOf,
    /// transaction -> address
    OutputOf(f64),
}

#[derive(Default)]
struct Inner {
    graph: DiGraph<Node, Edge>,
    addresses: HashMap<String, NodeIndex>,
    transactions: HashMap<String, NodeIndex>,
}

impl Inner {
    fn address_node(&mut self, address: &str) -> NodeIndex {
        if let Some(idx) = self.addresses.get(address) {
            return *idx;
        }
        let idx = self.graph.add_node(Node::Address {
            address: address.to_string(),
            labels: BTreeSet::new(),
            tag: None,
            category: None,
        });
        self.addresses.insert(address.to_string(), idx);
        idx
    }

    fn transaction_node(&self, txid: &str) -> StoreResult<NodeIndex> {
        self.transactions
            .get(txid)
            .copied()
            .ok_or_else(|| StoreError::UnknownNode(txid.to_string()))
    }
}

/// In-process graph store on top of petgraph. Same semantics as the SQLite
/// store; used for dry runs and tests.
#[derive(Default)]
pub struct MemoryGraphStore {
    inner: Mutex<Inner>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn node_count(&self) -> usize {
        self.lock().map(|g| g.graph.node_count()).unwrap_or(0)
    }

    pub fn edge_count(&self) -> usize {
        self.lock().map(|g| g.graph.edge_count()).unwrap_or(0)
    }

    pub fn has_address(&self, address: &str) -> bool {
        self.lock()
            .map(|g| g.addresses.contains_key(address))
            .unwrap_or(false)
    }

    pub fn has_transaction(&self, txid: &str) -> bool {
        self.lock()
            .map(|g| g.transactions.contains_key(txid))
            .unwrap_or(false)
    }

    pub fn transaction(&self, txid: &str) -> Option<TransactionRecord> {
        let inner = self.lock().ok()?;
        let idx = inner.transactions.get(txid)?;
        match &inner.graph[*idx] {
            Node::Transaction(record) => Some(record.clone()),
            Node::Address { .. } => None,
        }
    }

    pub fn labels(&self, address: &str) -> Vec<AddressLabel> {
        let Ok(inner) = self.lock() else {
            return Vec::new();
        };
        match inner.addresses.get(address).map(|idx| &inner.graph[*idx]) {
            Some(Node::Address { labels, .. }) => labels.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    pub fn tag(&self, address: &str) -> Option<(String, Option<String>)> {
        let inner = self.lock().ok()?;
        match &inner.graph[*inner.addresses.get(address)?] {
            Node::Address {
                tag: Some(tag),
                category,
                ..
            } => Some((tag.clone(), category.clone())),
            _ => None,
        }
    }

    /// Addresses that funded `txid`, sorted.
    pub fn input_links(&self, txid: &str) -> Vec<String> {
        let Ok(inner) = self.lock() else {
            return Vec::new();
        };
        let Some(tx) = inner.transactions.get(txid) else {
            return Vec::new();
        };
        let mut links: Vec<String> = inner
            .graph
            .edges_directed(*tx, Direction::Incoming)
            .filter(|e| *e.weight() == Edge::InputOf)
            .filter_map(|e| match &inner.graph[e.source()] {
                Node::Address { address, .. } => Some(address.clone()),
                Node::Transaction(_) => None,
            })
            .collect();
        links.sort();
        links
    }

    /// (address, amount) pairs paid by `txid`, sorted.
    pub fn output_links(&self, txid: &str) -> Vec<(String, f64)> {
        let Ok(inner) = self.lock() else {
            return Vec::new();
        };
        let Some(tx) = inner.transactions.get(txid) else {
            return Vec::new();
        };
        let mut links: Vec<(String, f64)> = inner
            .graph
            .edges_directed(*tx, Direction::Outgoing)
            .filter_map(|e| match (e.weight(), &inner.graph[e.target()]) {
                (Edge::OutputOf(amount), Node::Address { address, .. }) => {
                    Some((address.clone(), *amount))
                }
                _ => None,
            })
            .collect();
        links.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));
        links
    }
}

impl GraphStore for MemoryGraphStore {
    fn session(&self) -> StoreResult<Box<dyn GraphSession + Send + '_>> {
        Ok(Box::new(MemorySession { store: self }))
    }

    fn addresses(&self) -> StoreResult<Vec<String>> {
        let mut addresses: Vec<String> = self.lock()?.addresses.keys().cloned().collect();
        addresses.sort();
        Ok(addresses)
    }

    fn tag_address(&self, address: &str, tag: &str, category: Option<&str>) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        let Some(idx) = inner.addresses.get(address).copied() else {
            return Ok(false);
        };
        if let Node::Address {
            tag: node_tag,
            category: node_category,
            ..
        } = &mut inner.graph[idx]
        {
            *node_tag = Some(tag.to_string());
            *node_category = category.map(str::to_string);
        }
        Ok(true)
    }

    fn stats(&self) -> StoreResult<GraphStats> {
        let inner = self.lock()?;
        let mut stats = GraphStats {
            addresses: inner.addresses.len(),
            transactions: inner.transactions.len(),
            ..Default::default()
        };

        for node in inner.graph.node_weights() {
            if let Node::Address { labels, tag, .. } = node {
                if labels.contains(&AddressLabel::Service) {
                    stats.service_addresses += 1;
                }
                if labels.contains(&AddressLabel::Seed) {
                    stats.seed_addresses += 1;
                }
                if tag.is_some() {
                    stats.tagged_addresses += 1;
                }
            }
        }
        for edge in inner.graph.edge_weights() {
            match edge {
                Edge::InputOf => stats.input_links += 1,
                Edge::OutputOf(_) => stats.output_links += 1,
            }
        }
        Ok(stats)
    }
}

struct MemorySession<'a> {
    store: &'a MemoryGraphStore,
}

impl GraphSession for MemorySession<'_> {
    fn upsert_address(&mut self, address: &str) -> StoreResult<()> {
        self.store.lock()?.address_node(address);
        Ok(())
    }

    fn upsert_transaction(&mut self, tx: &TransactionRecord) -> StoreResult<()> {
        let mut inner = self.store.lock()?;
        match inner.transactions.get(&tx.txid).copied() {
            Some(idx) => inner.graph[idx] = Node::Transaction(tx.clone()),
            None => {
                let idx = inner.graph.add_node(Node::Transaction(tx.clone()));
                inner.transactions.insert(tx.txid.clone(), idx);
            }
        }
        Ok(())
    }

    fn label_address(&mut self, address: &str, label: AddressLabel) -> StoreResult<()> {
        let mut inner = self.store.lock()?;
        let idx = inner.address_node(address);
        if let Node::Address { labels, .. } = &mut inner.graph[idx] {
            labels.insert(label);
        }
        Ok(())
    }

    fn link_input(&mut self, address: &str, txid: &str) -> StoreResult<()> {
        let mut inner = self.store.lock()?;
        let tx = inner.transaction_node(txid)?;
        let addr = inner.address_node(address);
        let exists = inner
            .graph
            .edges_connecting(addr, tx)
            .any(|e| *e.weight() == Edge::InputOf);
        if !exists {
            inner.graph.add_edge(addr, tx, Edge::InputOf);
        }
        Ok(())
    }

    fn link_output(&mut self, txid: &str, address: &str, amount: f64) -> StoreResult<()> {
        let mut inner = self.store.lock()?;
        let tx = inner.transaction_node(txid)?;
        let addr = inner.address_node(address);
        let exists = inner
            .graph
            .edges_connecting(tx, addr)
            .any(|e| *e.weight() == Edge::OutputOf(amount));
        if !exists {
            inner.graph.add_edge(tx, addr, Edge::OutputOf(amount));
        }
        Ok(())
    }
}
