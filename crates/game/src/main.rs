//! Headless model drawing driver: spawns a synthetic RTS scene and runs the
//! unit and feature drawers against a recording device for a number of frames.

mod config;
mod scene;

use anyhow::{Context, Result};
use engine_core::{FrameCounters, ModelType, SolidObject, Transform};
use glam::Vec3;
use hecs::Entity;
use renderer::device::ProgramDesc;
use renderer::{
    Camera, CameraSet, DrawContext, DrawStats, FarTextureHandler, FeatureDrawer, FeatureKind, FlatGround,
    FrameView, GraphicsDevice, LuaObjectDrawer, NoEvents, RecordingDevice, RenderEnv, ShadingProfile, SightCircles,
    TempDrawUnit, UnitDrawer, UnitKind,
};

use config::GameConfig;
use scene::{SceneSpawner, Spawned, MAP_HALF_SIZE};

/// Sight radius of every unit, in elmos.
const SIGHT_RADIUS: f32 = 400.0;
/// A building is destroyed every this many frames, leaving ghosts behind.
const DESTROY_INTERVAL: u64 = 15;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = GameConfig::load();
    if std::env::args().any(|a| a == "--write-config") {
        config.save();
    }
    config.drawer.validate().context("invalid drawer configuration")?;
    log::info!(
        "Starting modeldraw: {} units, {} features, {} frames",
        config.unit_count,
        config.feature_count,
        config.frames
    );

    let mut device = RecordingDevice::new();
    let profile = ShadingProfile {
        deferred_allowed: config.drawer.allow_deferred_model_rendering,
        ..ShadingProfile::full()
    };
    let mut units = UnitDrawer::new(UnitKind::new(&config.drawer), &config.drawer, profile, &mut device);
    let mut features = FeatureDrawer::new(FeatureKind::new(&config.drawer), &config.drawer, profile, &mut device);
    log::info!(
        "Unit drawer uses {}, feature drawer uses {}",
        units.selected(),
        features.selected()
    );

    let shadow_program = device
        .create_program(&ProgramDesc {
            name: "ShadowGen-Model".to_string(),
            vertex: "shadow_model.vert",
            fragment: "shadow_model.frag",
            defines: Vec::new(),
        })
        .context("shadow program")?;

    let mut spawner = SceneSpawner::new(config.seed);
    let teams = spawner.teams(config.team_count);
    let mut world = hecs::World::new();
    let spawned = spawner.populate(&mut world, &teams, &config);

    let mut sight = SightCircles::new();
    let mut buildings = Vec::new();
    for s in &spawned {
        match *s {
            Spawned::Unit(e) => {
                units.add_object(&world, e).with_context(|| format!("adding unit {e:?}"))?;
                let mut q = world.query_one::<(&Transform, &SolidObject)>(e)?;
                if let Some((transform, solid)) = q.get() {
                    if let Some(ally) = teams.ally_team(solid.team) {
                        sight.add(ally, transform.position, SIGHT_RADIUS);
                    }
                    if solid.is_building {
                        buildings.push(e);
                    }
                }
            }
            Spawned::Feature(e) => {
                features.add_object(&world, e).with_context(|| format!("adding feature {e:?}"))?;
            }
        }
    }

    let ground = FlatGround(-20.0);
    let mut lua = LuaObjectDrawer::new(&config.drawer);
    lua.set_geometry_buffer_valid(true);
    let mut far_textures = FarTextureHandler::new();
    let mut events = NoEvents;
    let mut counters = FrameCounters::new();
    let mut totals = [DrawStats::default(); 2];

    // Placement preview of a building, shown for the first half of the run.
    if let Some(&first) = buildings.first() {
        let model = world.get::<&SolidObject>(first)?.model.clone();
        units.add_temp_draw_unit(
            TempDrawUnit {
                model,
                team: 0,
                position: Vec3::new(0.0, 0.0, -200.0),
                rotation: 0.0,
                timeout_frame: config.frames / 2,
            },
            false,
        );
    }

    for _ in 0..config.frames {
        let sim_frame = counters.advance_sim();
        let draw_frame = counters.advance_draw();

        if sim_frame % DESTROY_INTERVAL == 0 {
            if let Some(e) = buildings.pop() {
                destroy_unit(&mut world, &mut units, &mut lua, e)?;
            }
        }

        let mut env = frame_env(sim_frame, draw_frame);
        env.shadow_program = Some(shadow_program);

        let view = FrameView {
            world: &world,
            env: &env,
            ground: &ground,
            los: &sight,
        };
        let unit_update = units.update(&view);
        let feature_update = features.update(&view);

        device.clear();
        let mut ctx = DrawContext {
            device: &mut device,
            teams: &teams,
            lua: &mut lua,
            far_textures: &mut far_textures,
            events: &mut events,
        };
        if env.water_reflection {
            units.draw(&mut ctx, &env, true, false);
            features.draw(&mut ctx, &env, true, false);
        }
        units.draw(&mut ctx, &env, false, false);
        features.draw(&mut ctx, &env, false, false);
        units.draw_alpha_pass(&mut ctx, &env);
        features.draw_alpha_pass(&mut ctx, &env);
        units.draw_shadow_pass(&mut ctx, &env);
        features.draw_shadow_pass(&mut ctx, &env);

        for (total, drawer_stats) in totals.iter_mut().zip([units.stats(), features.stats()]) {
            accumulate(total, drawer_stats);
        }
        log::debug!(
            "frame {draw_frame}: units {:?} ({} icons), features {:?} ({} impostors), {} commands ({} draws)",
            units.stats(),
            unit_update.icons,
            features.stats(),
            feature_update.far_textures,
            device.commands.len(),
            device.count_draws()
        );
    }

    log::info!("Unit totals: {:?}", totals[0]);
    log::info!("Feature totals: {:?}", totals[1]);

    units.kill(&mut device);
    features.kill(&mut device);
    device.delete_program(shadow_program);
    Ok(())
}

/// Camera orbiting the map centre, one degree per frame.
fn frame_env(sim_frame: u64, draw_frame: u64) -> RenderEnv {
    let angle = (sim_frame as f32).to_radians();
    let position = Vec3::new(angle.sin() * MAP_HALF_SIZE * 0.5, 600.0, angle.cos() * MAP_HALF_SIZE * 0.5);
    let camera = Camera::looking_at(position, Vec3::ZERO);

    let mut env = RenderEnv::new(CameraSet::from_player(camera));
    env.sim_frame = sim_frame;
    env.draw_frame = draw_frame;
    env.shadows_loaded = true;
    env.shadow_gen_models = true;
    env.water_reflection = sim_frame % 2 == 0;
    env
}

fn destroy_unit(world: &mut hecs::World, units: &mut UnitDrawer, lua: &mut LuaObjectDrawer, e: Entity) -> Result<()> {
    let model_type = world.get::<&SolidObject>(e).map(|s| s.model.model_type).unwrap_or(ModelType::S3o);
    units.del_object(world, lua, e);
    world.despawn(e).context("despawning destroyed unit")?;
    log::debug!("Destroyed {} building {e:?}", model_type.name());
    Ok(())
}

fn accumulate(total: &mut DrawStats, frame: DrawStats) {
    total.opaque += frame.opaque;
    total.deferred += frame.deferred;
    total.alpha += frame.alpha;
    total.shadow += frame.shadow;
    total.aux += frame.aux;
    total.material += frame.material;
    total.far_textures += frame.far_textures;
}
