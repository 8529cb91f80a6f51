mod common;

use assetkeep_api::{AssetKind, MoveBlocker};
use assetkeep_core::watch::WatchEvent;
use assetkeep_core::AssetConfig;
use common::{Project, engine, engine_with, id, test_config};
use std::collections::BTreeSet;

#[tokio::test]
async fn test_scene_referencing_atlas_blocks_removal() {
    let project = Project::new().with_level();
    let engine = engine(&project).await;

    let atlas = id("atlas/sprites.atlas");
    let scene = id("scene/level1.scene");
    assert_eq!(engine.users_of(&atlas), BTreeSet::from([scene.clone()]));
    assert!(!engine.can_safely_remove(&atlas));

    let usages = engine.analyze_usages(&atlas);
    assert_eq!(usages.target, atlas);
    assert_eq!(usages.users, vec![scene.clone()]);
    assert_eq!(usages.count(), 1);

    // The page image is used by the atlas.
    let page = id("atlas/sprites.png");
    assert_eq!(engine.users_of(&page), BTreeSet::from([atlas.clone()]));
    assert!(!engine.can_safely_remove(&page));

    // Unused texture of an analyzable kind.
    assert!(engine.can_safely_remove(&id("gfx/hero.png")));
    // Scenes are not analyzable, so nothing proves them unused.
    assert!(!engine.can_safely_remove(&scene));
}

#[tokio::test]
async fn test_no_removal_is_safe_while_users_exist() {
    let project = Project::new().with_level();
    project.write("scene/level2.scene", r#"{ "hero": "gfx/hero.png", "atlas": "atlas/sprites.atlas" }"#);
    let engine = engine(&project).await;

    for asset in engine.index().files() {
        if !engine.users_of(&asset).is_empty() {
            assert!(!engine.can_safely_remove(&asset), "{asset} has users");
        }
    }
    assert_eq!(engine.users_of(&id("atlas/sprites.atlas")).len(), 2);
}

#[tokio::test]
async fn test_rescan_is_idempotent() {
    let project = Project::new().with_level();
    let engine = engine(&project).await;
    let scene = id("scene/level1.scene");

    let before = (engine.graph().references_of(&scene), engine.graph().stats());
    assert_eq!(engine.graph().rescan(&scene).await.unwrap(), 1);
    assert_eq!(engine.graph().rescan(&scene).await.unwrap(), 1);
    let after = (engine.graph().references_of(&scene), engine.graph().stats());

    assert_eq!(before, after);
}

#[tokio::test]
async fn test_edited_scene_replaces_its_references() {
    let project = Project::new().with_level();
    let engine = engine(&project).await;
    let scene = id("scene/level1.scene");

    let path = project.write("scene/level1.scene", r#"{ "hero": "gfx/hero.png" }"#);
    engine.ingest(WatchEvent::modified(path));
    engine.flush().await;

    assert_eq!(engine.graph().references_of(&scene), BTreeSet::from([id("gfx/hero.png")]));
    assert!(engine.users_of(&id("atlas/sprites.atlas")).is_empty());
    assert!(engine.can_safely_remove(&id("atlas/sprites.atlas")));
    assert!(!engine.can_safely_remove(&id("gfx/hero.png")));
}

#[tokio::test]
async fn test_undecodable_scene_keeps_previous_references() {
    let project = Project::new().with_level();
    let engine = engine(&project).await;
    let scene = id("scene/level1.scene");
    let atlas = id("atlas/sprites.atlas");

    let path = project.write("scene/level1.scene", [0xff, 0xfe, 0x00]);
    engine.ingest(WatchEvent::modified(path));
    engine.flush().await;

    assert_eq!(engine.users_of(&atlas), BTreeSet::from([scene.clone()]));
    assert_eq!(engine.graph().unscanned(), vec![scene.clone()]);

    // Nothing can be moved while some asset's references are unknown.
    assert_eq!(
        engine.check_move(&id("gfx/hero.png"), None),
        Err(MoveBlocker::UnscannedUsers(vec![scene]))
    );
}

#[tokio::test]
async fn test_move_checks() {
    let project = Project::new().with_level();
    project.write("scene/level2.scene", r#"{ "hero": "gfx/missing.png" }"#);
    let engine = engine(&project).await;

    let hero = id("gfx/hero.png");
    let atlas = id("atlas/sprites.atlas");

    assert!(engine.can_safely_move(&hero));
    assert!(!engine.can_safely_move(&atlas));
    assert_eq!(
        engine.check_move(&atlas, None),
        Err(MoveBlocker::InUse(vec![id("scene/level1.scene")]))
    );
    assert_eq!(
        engine.check_move(&id("scene/level1.scene"), None),
        Err(MoveBlocker::NotAnalyzable(AssetKind::Scene))
    );
    assert_eq!(
        engine.check_move(&id("gfx/nowhere.png"), None),
        Err(MoveBlocker::NotIndexed)
    );
    assert_eq!(
        engine.check_move(&hero, Some(&id("gfx/hero.atlas"))),
        Err(MoveBlocker::KindChange {
            from: AssetKind::Texture,
            to: AssetKind::Atlas,
        })
    );
    // Moving onto a dangling target would silently satisfy level2's reference.
    assert_eq!(
        engine.check_move(&hero, Some(&id("gfx/missing.png"))),
        Err(MoveBlocker::CapturesDanglingReferences(vec![id("scene/level2.scene")]))
    );
    assert!(engine.check_move(&hero, Some(&id("gfx/renamed.png"))).is_ok());
}

#[tokio::test]
async fn test_deleted_target_becomes_dangling() {
    let project = Project::new().with_level();
    let engine = engine(&project).await;
    let atlas = id("atlas/sprites.atlas");

    std::fs::remove_file(project.path("atlas/sprites.atlas")).unwrap();
    engine.ingest(WatchEvent::deleted(project.path("atlas/sprites.atlas"), false));
    engine.flush().await;

    assert!(!engine.index().contains(&atlas));
    assert_eq!(engine.graph().dangling(), vec![atlas.clone()]);
    // The scene still holds the reference.
    assert_eq!(engine.users_of(&atlas), BTreeSet::from([id("scene/level1.scene")]));
    // The atlas no longer uses its page image.
    assert!(engine.users_of(&id("atlas/sprites.png")).is_empty());
}

#[tokio::test]
async fn test_results_apply_in_issue_order() {
    let project = Project::new().with_level();
    let engine = engine(&project).await;
    let graph = engine.graph();
    let scene = id("scene/level1.scene");

    let older = graph.reserve_scan();
    let newer = graph.reserve_scan();

    project.write("scene/level1.scene", r#"{ "hero": "gfx/hero.png" }"#);
    engine.invalidate(&scene);
    graph.rescan_reserved(newer, &scene).await.unwrap();

    project.write("scene/level1.scene", r#"{ "atlas": "atlas/sprites.atlas" }"#);
    engine.invalidate(&scene);
    graph.rescan_reserved(older, &scene).await.unwrap();

    assert_eq!(graph.references_of(&scene), BTreeSet::from([id("gfx/hero.png")]));
}

#[tokio::test]
async fn test_reference_spelling_follows_case_insensitive_index() {
    let project = Project::new().with_level();
    project.write(
        "scene/level1.scene",
        r#"{ "atlas": "Atlas/Sprites.atlas", "later": "GFX/Later.png" }"#,
    );
    let config = AssetConfig {
        case_sensitive: Some(false),
        ..test_config()
    };
    let engine = engine_with(&project, config).await;
    let scene = id("scene/level1.scene");
    let atlas = id("atlas/sprites.atlas");

    assert_eq!(engine.users_of(&atlas), BTreeSet::from([scene.clone()]));
    assert!(!engine.can_safely_remove(&atlas));
    assert!(engine.graph().references_of(&scene).contains(&atlas));
    assert_eq!(engine.graph().dangling(), vec![id("gfx/Later.png")]);

    // The file shows up later under another spelling.
    let path = project.write("gfx/later.png", "png");
    engine.ingest(WatchEvent::created(path, false));
    engine.flush().await;

    assert_eq!(engine.users_of(&id("gfx/later.png")), BTreeSet::from([scene]));
    assert!(!engine.can_safely_remove(&id("gfx/later.png")));
    assert!(engine.graph().dangling().is_empty());
}

#[tokio::test]
async fn test_unscanned_asset_blocks_removal_elsewhere() {
    let project = Project::new().with_level();
    project.write("scene/broken.scene", [0xff, 0xfe, 0x00]);
    let engine = engine(&project).await;
    let hero = id("gfx/hero.png");

    assert_eq!(engine.graph().unscanned(), vec![id("scene/broken.scene")]);
    assert!(!engine.can_safely_remove(&hero));
    assert!(!engine.can_safely_move(&hero));

    std::fs::remove_file(project.path("scene/broken.scene")).unwrap();
    engine.ingest(WatchEvent::deleted(project.path("scene/broken.scene"), false));
    engine.flush().await;

    assert!(engine.can_safely_remove(&hero));
    assert!(engine.can_safely_move(&hero));
}

#[tokio::test]
async fn test_deleted_source_releases_its_ticket() {
    let project = Project::new().with_level();
    let engine = engine(&project).await;
    let before = engine.graph().stats().sequenced;
    assert_eq!(before, 2);

    let path = project.path("scene/level1.scene");
    std::fs::remove_file(&path).unwrap();
    engine.ingest(WatchEvent::deleted(path, false));
    engine.flush().await;

    assert_eq!(engine.graph().stats().sequenced, before - 1);
    assert!(engine.users_of(&id("atlas/sprites.atlas")).is_empty());
}
