//! Loaders for interaction files.
//!
//! The line format has one user per line: whitespace-separated integers, the
//! first being the user id (equal to the zero-based line index) and the rest
//! the ids of items the user interacted with. Item ids must already be
//! compacted to `0..num_items`.
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use tracing::info;

use crate::data::{Interaction, Interactions};
use crate::UserId;

/// Dataset error types.
#[derive(Debug, Fail)]
pub enum DatasetError {
    /// A line's user id does not match its position in the file.
    #[fail(display = "Line {}: user id {} does not match the line index.", line, user_id)]
    NonContiguousUser {
        /// Zero-based line index.
        line: usize,
        /// The user id found on that line.
        user_id: UserId,
    },
    /// A token is not a non-negative integer.
    #[fail(display = "Line {}: invalid token {:?}.", line, token)]
    InvalidToken {
        /// Zero-based line index.
        line: usize,
        /// The offending token.
        token: String,
    },
}

fn parse_line(line_idx: usize, line: &str) -> Result<Vec<usize>, DatasetError> {
    line.split_whitespace()
        .map(|token| match token.parse::<usize>() {
            // Ids must leave room for the exclusive shape bound.
            Ok(value) if value < std::usize::MAX => Ok(value),
            _ => Err(DatasetError::InvalidToken {
                line: line_idx,
                token: token.to_owned(),
            }),
        })
        .collect()
}

/// Parse the line format from `reader`.
///
/// For training data (`held_out == false`) every line is a user, even one
/// without items. For held-out data, lines with fewer than two integers are
/// skipped.
pub fn parse_user_lines<R: Read>(reader: R, held_out: bool) -> Result<Interactions, failure::Error> {
    let mut interactions = Interactions::new(0, 0);
    let mut num_lines = 0;

    for (line_idx, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let values = parse_line(line_idx, &line)?;
        num_lines = line_idx + 1;

        let (&user_id, item_ids) = match values.split_first() {
            Some(split) => split,
            None => continue,
        };

        if user_id != line_idx {
            return Err(DatasetError::NonContiguousUser {
                line: line_idx,
                user_id,
            }
            .into());
        }

        if held_out && item_ids.is_empty() {
            continue;
        }

        for &item_id in item_ids {
            interactions.push(Interaction::new(user_id, item_id));
        }
    }

    if !held_out {
        interactions.expand_shape(num_lines, 0);
    }

    Ok(interactions)
}

/// Load training interactions in the line format.
pub fn load_user_lines<P: AsRef<Path>>(path: P) -> Result<Interactions, failure::Error> {
    parse_user_lines(File::open(path)?, false)
}

/// Load training and held-out interactions, giving both the same shape.
pub fn load_train_test<P: AsRef<Path>, Q: AsRef<Path>>(
    train_path: P,
    test_path: Q,
) -> Result<(Interactions, Interactions), failure::Error> {
    let mut train = parse_user_lines(File::open(train_path)?, false)?;
    let mut test = parse_user_lines(File::open(test_path)?, true)?;

    let (num_users, num_items) = (
        train.num_users().max(test.num_users()),
        train.num_items().max(test.num_items()),
    );
    train.expand_shape(num_users, num_items);
    test.expand_shape(num_users, num_items);

    info!(
        num_users,
        num_items,
        train = train.len(),
        test = test.len(),
        "Loaded interactions"
    );

    Ok((train, test))
}

/// Load `user_id,item_id` records from a CSV file with a header row.
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Interactions, failure::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    let interactions: Vec<Interaction> = reader.deserialize().collect::<Result<Vec<_>, _>>()?;

    Ok(Interactions::from(interactions))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn training_lines_define_users() {
        let input = "0 1 2\n1 0\n2\n3 3 1\n";
        let interactions = parse_user_lines(input.as_bytes(), false).unwrap();

        assert_eq!(interactions.shape(), (4, 4));
        assert_eq!(interactions.len(), 5);

        let compressed = interactions.to_compressed();
        assert_eq!(compressed.get_user(0).unwrap().item_ids, &[1, 2]);
        assert!(compressed.get_user(2).unwrap().is_empty());
        assert_eq!(compressed.get_user(3).unwrap().item_ids, &[1, 3]);
    }

    #[test]
    fn held_out_lines_without_items_are_skipped() {
        let input = "0 4\n1\n2 0 1\n";
        let interactions = parse_user_lines(input.as_bytes(), true).unwrap();

        assert_eq!(interactions.len(), 3);
        assert!(interactions.data().iter().all(|x| x.user_id() != 1));
        assert_eq!(interactions.shape(), (3, 5));
    }

    #[test]
    fn non_contiguous_users_are_rejected() {
        let error = parse_user_lines("0 1\n2 3\n".as_bytes(), false).unwrap_err();

        match error.downcast::<DatasetError>() {
            Ok(DatasetError::NonContiguousUser { line, user_id }) => {
                assert_eq!(line, 1);
                assert_eq!(user_id, 2);
            }
            other => panic!("Expected non-contiguous user, got {:?}", other),
        }
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert!(parse_user_lines("0 1 x\n".as_bytes(), false).is_err());
        assert!(parse_user_lines("0 -1\n".as_bytes(), false).is_err());
    }

    #[test]
    fn maximal_ids_are_rejected() {
        let input = format!("0 {}\n", std::usize::MAX);
        let error = parse_user_lines(input.as_bytes(), false).unwrap_err();

        match error.downcast::<DatasetError>() {
            Ok(DatasetError::InvalidToken { line, token }) => {
                assert_eq!(line, 0);
                assert_eq!(token, std::usize::MAX.to_string());
            }
            other => panic!("Expected invalid token, got {:?}", other),
        }
    }

    #[test]
    fn user_lines_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.txt");
        fs::write(&path, "0 2 1\n1\n2 0\n").unwrap();

        let interactions = load_user_lines(&path).unwrap();

        assert_eq!(interactions.shape(), (3, 3));
        assert_eq!(interactions.len(), 3);
        assert!(load_user_lines(dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn train_and_test_files_share_a_shape() {
        let dir = tempfile::tempdir().unwrap();
        let train_path = dir.path().join("train.txt");
        let test_path = dir.path().join("test.txt");
        fs::write(&train_path, "0 1\n1 0\n").unwrap();
        fs::write(&test_path, "0 4\n1\n2 3\n").unwrap();

        let (train, test) = load_train_test(&train_path, &test_path).unwrap();

        assert_eq!(train.shape(), (3, 5));
        assert_eq!(test.shape(), (3, 5));
        assert_eq!(test.len(), 2);
    }

    #[test]
    fn csv_records_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interactions.csv");
        fs::write(&path, "user_id,item_id\n0,3\n2,1\n0,3\n").unwrap();

        let interactions = load_csv(&path).unwrap();

        assert_eq!(interactions.len(), 3);
        assert_eq!(interactions.shape(), (3, 4));
        assert_eq!(interactions.data()[1], Interaction::new(2, 1));

        let compressed = interactions.to_compressed();
        assert_eq!(compressed.get_user(0).unwrap().item_ids, &[3]);
    }

    #[test]
    fn malformed_csv_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interactions.csv");
        fs::write(&path, "user_id,item_id\n0,x\n").unwrap();

        assert!(load_csv(&path).is_err());
    }
}
