use assetkeep_api::AssetId;
use std::path::PathBuf;

pub async fn run(path: PathBuf, asset: String) -> Result<(), Box<dyn std::error::Error>> {
    let engine = crate::open_engine(path).await?;
    let id = AssetId::parse(&asset)?;

    let usages = engine.analyze_usages(&id);
    println!("{} is used by {} asset(s)", id, usages.count());
    for user in &usages.users {
        println!("  {}", user);
    }

    println!("removable: {}", engine.can_safely_remove(&id));
    match engine.check_move(&id, None) {
        Ok(()) => println!("movable: true"),
        Err(blocker) => println!("movable: false ({})", blocker),
    }
    Ok(())
}
