#![cfg_attr(coverage_nightly, coverage(off))]

use mockall::mock;

use crate::{EventSource, Listener};

mock! {
    #[derive(Debug)]
    pub Source {
    }

    impl EventSource for Source {
        type Key = u32;
        type Arg = String;

        fn subscribe_once(&self, key: &u32, listener: Listener<String>);
        fn subscribe(&self, key: &u32, listener: Listener<String>);
        fn unsubscribe(&self, key: &u32, listener: &Listener<String>);
    }
}
