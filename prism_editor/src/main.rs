//! Headless editor driver
//!
//! Boots the engine over the null renderer and null audio backend,
//! registers the full six-view frame (skybox, world, editor world,
//! wireframe, UI, pick), loads a demo scene from an in-memory package and
//! runs a bounded frame loop. Useful as a smoke test of the whole frame
//! contract without a window system.

use std::sync::Arc;

use prism_engine::prelude::*;
use prism_engine::renderer::types::{ProjectionKind, Viewport};
use prism_engine::resource::{AudioPcm, ResourceData, ResourceError};
use prism_engine::view::{
    EditorWorldView, PickView, SkyboxView, UiView, WireframeView, WorldView,
};

const WINDOW_WIDTH: f32 = 1280.0;
const WINDOW_HEIGHT: f32 = 720.0;
const FRAME_COUNT: u32 = 300;
const FRAME_DELTA: f32 = 1.0 / 60.0;

const DEMO_SCENE: &str = r#"(
    name: "demo",
    ambient_colour: (0.2, 0.2, 0.25, 1.0),
    nodes: [
        (
            name: "ground",
            mesh: Some("plane"),
            material: Some("builtin.material.default"),
            scale: (20.0, 1.0, 20.0),
            extents: (0.5, 0.05, 0.5),
        ),
        (
            name: "crate",
            position: (0.0, 1.0, -6.0),
            mesh: Some("cube"),
            material: Some("builtin.material.default"),
            children: [
                (
                    name: "crate_lid",
                    position: (0.0, 1.1, 0.0),
                    mesh: Some("cube"),
                    material: Some("builtin.material.default"),
                    scale: (1.0, 0.2, 1.0),
                ),
            ],
        ),
    ],
)"#;

/// Serves the demo package from memory
struct DemoLoader;

impl ResourceLoader for DemoLoader {
    fn load(
        &self,
        key: &ResourceKey,
        resource_type: ResourceType,
    ) -> Result<ResourceData, ResourceError> {
        match resource_type {
            ResourceType::Text if key.name == "demo" => {
                Ok(ResourceData::Text(DEMO_SCENE.to_string()))
            }
            ResourceType::StaticMesh => {
                // 32 bytes per vertex; a unit cube is plenty for a smoke run.
                let vertex_count = if key.name == "plane" { 6 } else { 36 };
                Ok(ResourceData::StaticMesh(
                    vec![0u8; vertex_count * 32],
                    (0..vertex_count as u32).collect(),
                ))
            }
            ResourceType::Audio => Ok(ResourceData::Audio(AudioPcm {
                sample_rate: 44_100,
                channels: 1,
                samples: vec![0; 44_100],
                mono: None,
            })),
            _ => Err(ResourceError::LoadFailed {
                name: key.name.clone(),
                package: key.package.clone(),
                reason: "not part of the demo package".into(),
            }),
        }
    }
}

fn world_viewport() -> Viewport {
    Viewport::new(
        Vec4::new(0.0, 0.0, WINDOW_WIDTH, WINDOW_HEIGHT),
        ProjectionKind::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
        },
    )
}

fn ui_viewport() -> Viewport {
    Viewport::new(
        Vec4::new(0.0, 0.0, WINDOW_WIDTH, WINDOW_HEIGHT),
        ProjectionKind::Orthographic {
            near: -100.0,
            far: 100.0,
        },
    )
}

fn register_views(engine: &mut EngineSystems) -> Result<(), RenderError> {
    let camera = Some("editor".to_string());

    engine.register_view(RenderViewConfig {
        view: Box::new(SkyboxView::new()),
        viewport: world_viewport(),
        camera: camera.clone(),
    })?;
    engine.register_view(RenderViewConfig {
        view: Box::new(WorldView::new()),
        viewport: world_viewport(),
        camera: camera.clone(),
    })?;
    engine.register_view(RenderViewConfig {
        view: Box::new(EditorWorldView::new()),
        viewport: world_viewport(),
        camera: camera.clone(),
    })?;
    engine.register_view(RenderViewConfig {
        view: Box::new(WireframeView::new()),
        viewport: world_viewport(),
        camera: camera.clone(),
    })?;
    engine.register_view(RenderViewConfig {
        view: Box::new(UiView::new()),
        viewport: ui_viewport(),
        camera: None,
    })?;
    engine.register_view(RenderViewConfig {
        view: Box::new(PickView::new()),
        viewport: world_viewport(),
        camera,
    })?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut engine = match EngineSystems::new(
        Box::new(NullRenderer::new()),
        Box::new(NullAudioBackend::new()),
        Arc::new(DemoLoader),
        EngineConfig::default(),
    ) {
        Ok(engine) => engine,
        Err(err) => {
            log::error!("engine boot failed: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = engine.cameras.acquire("editor") {
        log::error!("camera setup failed: {err}");
        std::process::exit(1);
    }
    if let Some(camera) = engine.cameras.get_mut("editor") {
        camera.position_set(Vec3::new(0.0, 2.0, 8.0));
    }

    if let Err(err) = register_views(&mut engine) {
        log::error!("view registration failed: {err}");
        std::process::exit(1);
    }
    log::info!("views registered: {:?}", engine.views.view_names());

    if let Err(err) = engine.scene_load("demo", "demo_pkg") {
        log::error!("scene load failed: {err}");
        std::process::exit(1);
    }

    let music = match engine.audio.acquire(
        "ambience",
        "demo_pkg",
        true,
        AudioSpace::TwoD,
        &mut engine.resources,
    ) {
        Ok(instance) => {
            if let Err(err) = engine.audio.play(instance) {
                log::warn!("ambience playback failed: {err}");
            }
            Some(instance)
        }
        Err(err) => {
            log::warn!("ambience unavailable: {err}");
            None
        }
    };

    for frame in 0..FRAME_COUNT {
        hud_status(&mut engine, frame);
        if let Err(err) = engine.frame(FRAME_DELTA) {
            log::error!("fatal render failure: {err}");
            break;
        }
    }

    if let Some(instance) = music {
        if let Err(err) = engine.audio.release(instance, &mut engine.resources) {
            log::warn!("ambience release failed: {err}");
        }
    }
    engine.shutdown();
    log::info!("demo run complete");
}

fn hud_status(engine: &mut EngineSystems, frame: u32) {
    engine.editor.hud.clear();
    engine.editor.hud.line(format!("frame {frame}"));
    let node_count = engine.scene.as_ref().map_or(0, |scene| scene.node_count());
    engine.editor.hud.line(format!("nodes {node_count}"));
}
