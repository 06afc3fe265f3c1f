//! Conversions from datastore settings to the driver's option types.

use mongodb::options::{
    Acknowledgment as DriverAcknowledgment, Collation, CursorType as DriverCursorType, FindOptions, Hint,
    ReadConcern as DriverReadConcern, ReadPreference as DriverReadPreference, SelectionCriteria,
    TransactionOptions as DriverTransactionOptions, WriteConcern as DriverWriteConcern,
};

use docmap_core::{
    backend::{ReadOptions, TransactionOptions},
    config::{Acknowledgment, ReadConcern, ReadPreference, WriteConcern},
    query::{CursorType, IndexHint, QueryOptions},
};

pub(crate) fn selection_criteria(preference: ReadPreference) -> SelectionCriteria {
    let preference = match preference {
        ReadPreference::Primary => DriverReadPreference::Primary,
        ReadPreference::PrimaryPreferred => DriverReadPreference::PrimaryPreferred {
            options: Default::default(),
        },
        ReadPreference::Secondary => DriverReadPreference::Secondary {
            options: Default::default(),
        },
        ReadPreference::SecondaryPreferred => DriverReadPreference::SecondaryPreferred {
            options: Default::default(),
        },
        ReadPreference::Nearest => DriverReadPreference::Nearest {
            options: Default::default(),
        },
    };

    SelectionCriteria::ReadPreference(preference)
}

pub(crate) fn read_concern(concern: ReadConcern) -> DriverReadConcern {
    match concern {
        ReadConcern::Local => DriverReadConcern::local(),
        ReadConcern::Available => DriverReadConcern::available(),
        ReadConcern::Majority => DriverReadConcern::majority(),
        ReadConcern::Linearizable => DriverReadConcern::linearizable(),
        ReadConcern::Snapshot => DriverReadConcern::snapshot(),
    }
}

pub(crate) fn write_concern(concern: &WriteConcern) -> DriverWriteConcern {
    let mut driver = DriverWriteConcern::default();
    driver.w = concern.w.as_ref().map(|w| match w {
        Acknowledgment::Nodes(nodes) => DriverAcknowledgment::Nodes(*nodes),
        Acknowledgment::Majority => DriverAcknowledgment::Majority,
        Acknowledgment::Custom(name) => DriverAcknowledgment::Custom(name.clone()),
    });
    driver.journal = concern.journal;
    driver.w_timeout = concern.w_timeout;
    driver
}

pub(crate) fn transaction_options(options: &TransactionOptions) -> DriverTransactionOptions {
    let mut driver = DriverTransactionOptions::default();
    driver.read_concern = options.read_concern.map(read_concern);
    driver.write_concern = options.write_concern.as_ref().map(write_concern);
    driver.selection_criteria = options.read_preference.map(selection_criteria);
    driver
}

/// Builds the options of a find. Read settings are left out inside a transaction,
/// where the server only accepts the transaction's own.
pub(crate) fn find_options(
    options: &QueryOptions,
    read: &ReadOptions,
    in_transaction: bool,
) -> FindOptions {
    let mut find = FindOptions::default();

    find.collation = options
        .collation
        .as_ref()
        .map(|locale| Collation::builder().locale(locale.clone()).build());
    find.hint = options.hint.as_ref().map(|hint| match hint {
        IndexHint::Name(name) => Hint::Name(name.clone()),
        IndexHint::Keys(keys) => Hint::Keys(keys.clone()),
    });
    find.max_time = options.max_time;
    find.batch_size = options.batch_size;
    find.comment = options.comment.clone().map(Into::into);
    find.min = options.min.clone();
    find.max = options.max.clone();
    find.return_key = options.return_key;
    find.show_record_id = options.show_record_id;
    find.cursor_type = options.cursor_type.map(|cursor| match cursor {
        CursorType::NonTailable => DriverCursorType::NonTailable,
        CursorType::Tailable => DriverCursorType::Tailable,
        CursorType::TailableAwait => DriverCursorType::TailableAwait,
    });

    if !in_transaction {
        find.selection_criteria = read.read_preference.map(selection_criteria);
        find.read_concern = read.read_concern.map(read_concern);
    }

    find
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn write_concern_keeps_every_component() {
        let concern = write_concern(&WriteConcern {
            w: Some(Acknowledgment::Nodes(2)),
            journal: Some(true),
            w_timeout: Some(Duration::from_millis(500)),
        });

        assert_eq!(concern.w, Some(DriverAcknowledgment::Nodes(2)));
        assert_eq!(concern.journal, Some(true));
        assert_eq!(concern.w_timeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn find_options_drop_read_settings_inside_transactions() {
        let read = ReadOptions {
            read_preference: Some(ReadPreference::Nearest),
            read_concern: Some(ReadConcern::Majority),
        };
        let options = QueryOptions {
            batch_size: Some(10),
            hint: Some(IndexHint::Name("name_1".to_string())),
            ..QueryOptions::default()
        };

        let outside = find_options(&options, &read, false);
        assert!(outside.selection_criteria.is_some());
        assert!(outside.read_concern.is_some());
        assert_eq!(outside.batch_size, Some(10));

        let inside = find_options(&options, &read, true);
        assert!(inside.selection_criteria.is_none());
        assert!(inside.read_concern.is_none());
        assert!(matches!(inside.hint, Some(Hint::Name(ref name)) if name == "name_1"));
    }
}
