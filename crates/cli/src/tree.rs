use assetkeep_api::{AssetId, FolderNode};
use std::path::PathBuf;

pub async fn run(
    path: PathBuf,
    folder: Option<String>,
    search: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = crate::open_engine(path).await?;

    let Some(folder) = folder else {
        print_folders(&engine.folder_tree(), 0);
        return Ok(());
    };

    let folder = AssetId::parse(&folder)?;
    engine.tree().remember_directory(&folder);
    let entries = match search {
        Some(needle) => engine.search(&folder, &needle)?,
        None => engine.entries(&folder)?,
    };
    for entry in entries {
        if entry.is_folder {
            println!("{}/", entry.name);
        } else {
            println!("{}", entry.name);
        }
    }
    engine.tree().save_view_state()?;
    Ok(())
}

fn print_folders(node: &FolderNode, depth: usize) {
    if depth > 0 {
        println!("{}{}/", "  ".repeat(depth - 1), node.name);
    }
    for child in &node.children {
        print_folders(child, depth + 1);
    }
}
