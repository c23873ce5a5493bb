use std::cell::RefCell;
use std::rc::Rc;

use postgres::{Client, NoTls};
use uuid::Uuid;

use ltree_core::{Error, MutationCoordinator, NodeId, PathConfig, Result};
use ltree_postgres::{ensure_schema, reset_for_tests, PgPathStore};
use ltree_test_support::{self as suite, Backend};

fn connect() -> Option<Rc<RefCell<Client>>> {
    let url = std::env::var("LTREE_POSTGRES_URL").ok()?;
    let client = Client::connect(&url, NoTls).ok()?;
    Some(Rc::new(RefCell::new(client)))
}

/// Every store gets its own table so scenarios never see each other's rows.
struct Postgres {
    client: Rc<RefCell<Client>>,
}

impl Backend for Postgres {
    type Store = PgPathStore;

    fn open(&mut self, config: &PathConfig) -> PgPathStore {
        let table = format!("ltree_test_{}", Uuid::new_v4().simple());
        let config = config.clone().with_table(table);
        ensure_schema(&mut self.client.borrow_mut(), &config).unwrap();
        PgPathStore::new(self.client.clone(), config).unwrap()
    }

    fn add_record(store: &mut PgPathStore, id: NodeId) -> Result<()> {
        store.insert_unplaced(id)
    }
}

#[test]
fn postgres_conformance_suite() {
    let Some(client) = connect() else {
        return;
    };
    suite::run_all(&mut Postgres { client });
}

#[test]
fn postgres_rejects_non_ltree_separator() {
    let Some(client) = connect() else {
        return;
    };
    let err = PgPathStore::new(client, PathConfig::default().with_separator('/')).err();
    assert!(matches!(err, Some(Error::InvalidConfig(_))));
}

#[test]
fn postgres_reset_clears_table() {
    let Some(client) = connect() else {
        return;
    };
    let config = PathConfig::default().with_table(format!("ltree_test_{}", Uuid::new_v4().simple()));
    ensure_schema(&mut client.borrow_mut(), &config).unwrap();
    let mut store = PgPathStore::new(client.clone(), config.clone()).unwrap();
    store.insert_unplaced(NodeId(1)).unwrap();
    store.insert_unplaced(NodeId(2)).unwrap();

    let codec = store.codec().clone();
    let mut tree = MutationCoordinator::new(store, codec);
    tree.make_root(NodeId(1)).unwrap();
    tree.append_to(NodeId(2), NodeId(1)).unwrap();
    assert_eq!(suite::label(&tree, 2), "0001.0001");

    reset_for_tests(&mut client.borrow_mut(), &config).unwrap();
    assert!(suite::dump(&tree).is_empty());
}
