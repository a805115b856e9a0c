use std::sync::Arc;

use anyhow::{Context, Result};

use operant_core::audio::AudioDriver;
use operant_core::channel::{ChannelAddress, DioDriver, InputChannel, OutputChannel};
use operant_core::clock::Clock;
use operant_core::config::{ComponentSpec, PanelConfig, TimeoutConfig};
use operant_core::registry::ConstructorRegistry;

use crate::hopper::Hopper;
use crate::lights::{CueLight, HouseLight};
use crate::panel::{ComponentHandle, Panel};
use crate::peck_port::PeckPort;
use crate::speaker::Speaker;

fn named_channel(spec: &ComponentSpec, name: &str) -> Result<ChannelAddress> {
    spec.channels
        .get(name)
        .cloned()
        .with_context(|| format!("component {:?} is missing channel {:?}", spec.role, name))
}

/// Registry of every component kind this panel family knows how to build.
/// Construction happens only through here, so an unknown kind is refused at
/// load time rather than discovered mid-session.
pub fn standard_registry(
    dio: Arc<dyn DioDriver>,
    audio: Arc<dyn AudioDriver>,
    clock: Arc<dyn Clock>,
    timeouts: &TimeoutConfig,
) -> ConstructorRegistry<ComponentHandle> {
    let mut registry = ConstructorRegistry::new();
    let debounce = timeouts.debounce();
    let confirm = timeouts.actuation_confirm();
    let poll = timeouts.poll_interval();

    {
        let dio = dio.clone();
        let clock = clock.clone();
        registry.register("hopper", move |spec| {
            let solenoid = OutputChannel::new(named_channel(spec, "solenoid")?, dio.clone());
            let position = InputChannel::new(
                named_channel(spec, "ir_beam")?,
                debounce,
                dio.clone(),
                clock.clone(),
            );
            Ok(ComponentHandle::Hopper(Hopper::new(
                solenoid,
                position,
                confirm,
                poll,
                clock.clone(),
            )))
        });
    }

    {
        let dio = dio.clone();
        let clock = clock.clone();
        registry.register("peck_port", move |spec| {
            let ir = InputChannel::new(
                named_channel(spec, "ir_beam")?,
                debounce,
                dio.clone(),
                clock.clone(),
            );
            let led = OutputChannel::new(named_channel(spec, "led")?, dio.clone());
            Ok(ComponentHandle::PeckPort(PeckPort::new(
                ir,
                led,
                poll,
                clock.clone(),
            )))
        });
    }

    {
        let dio = dio.clone();
        let clock = clock.clone();
        registry.register("house_light", move |spec| {
            let light = OutputChannel::new(named_channel(spec, "light")?, dio.clone());
            Ok(ComponentHandle::HouseLight(HouseLight::new(
                light,
                clock.clone(),
            )))
        });
    }

    {
        let dio = dio.clone();
        registry.register("cue_light", move |spec| {
            let red = OutputChannel::new(named_channel(spec, "red")?, dio.clone());
            let green = OutputChannel::new(named_channel(spec, "green")?, dio.clone());
            let blue = OutputChannel::new(named_channel(spec, "blue")?, dio.clone());
            Ok(ComponentHandle::CueLight(CueLight::new(red, green, blue)))
        });
    }

    {
        let audio = audio.clone();
        registry.register("speaker", move |_spec| {
            Ok(ComponentHandle::Speaker(Speaker::new(audio.clone())))
        });
    }

    registry
}

/// Validate the panel config against the registry, then construct every
/// declared component in order.
pub fn build_panel(
    config: &PanelConfig,
    registry: &ConstructorRegistry<ComponentHandle>,
) -> Result<Panel> {
    registry.validate(config)?;
    let mut components = Vec::with_capacity(config.components.len());
    for spec in &config.components {
        let handle = registry.construct(spec)?;
        components.push((spec.role.clone(), handle));
    }
    Ok(Panel::new(config.id.clone(), components))
}
