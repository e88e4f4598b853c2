//! Board files.

use std::path::Path;

use ironhex_core::board::Board;
use ironhex_core::data::parse_board;

/// Load every `.ron` board in a directory, sorted by name. Files that fail
/// to load are skipped with a warning; an unreadable directory yields no
/// boards.
#[must_use]
pub fn load_boards(dir: &Path) -> Vec<Board> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot read board directory");
            return Vec::new();
        }
    };
    let mut boards = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("ron") {
            continue;
        }
        let label = path.display().to_string();
        let loaded = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|source| parse_board(&source, &label).map_err(|e| e.to_string()));
        match loaded {
            Ok(board) => {
                tracing::debug!(board = board.name(), "board loaded");
                boards.push(board);
            }
            Err(e) => tracing::warn!(path = %label, error = %e, "skipping board"),
        }
    }
    boards.sort_by(|a, b| a.name().cmp(b.name()));
    tracing::info!(count = boards.len(), "boards available");
    boards
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ford.ron"),
            "BoardData(name: \"ford\", width: 8, height: 8, hexes: [((x: 2, y: 2), (water: 1))])",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.ron"), "BoardData(name: ").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a board").unwrap();

        let boards = load_boards(dir.path());
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].name(), "ford");
    }

    #[test]
    fn test_missing_directory_gives_no_boards() {
        assert!(load_boards(Path::new("/nonexistent/boards")).is_empty());
    }
}
