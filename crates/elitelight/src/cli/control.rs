//! `set` / `event` subcommands: one request through the control facade.

use super::{
    ApplyOutput, ControlOutcome, ControlRequest, ElitelightError, GlobalOpts, HOOK_TIMEOUT,
    LedState, Result, build_controller, kv, kv_width, load_valid_config, print_json,
};
use elitelight_lib::controller::RequestSource;
use elitelight_lib::led::Speed;
use elitelight_lib::mapping;

pub(super) fn cmd_set(color: &str, speed: &str, opts: &GlobalOpts) -> Result<()> {
    let speed = Speed::parse(speed)?;
    let state = LedState::parse(color, speed)?;
    apply(ControlRequest::manual(state), opts)
}

pub(super) fn cmd_event(name: &str, opts: &GlobalOpts) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ElitelightError::Config("event name is empty".into()));
    }
    apply(ControlRequest::event(name), opts)
}

fn apply(request: ControlRequest, opts: &GlobalOpts) -> Result<()> {
    let config = load_valid_config(opts.config_path.as_deref())?;
    let (controller, hooks) = build_controller(&config, opts, false)?;
    let state = request.desired_state().or_else(|| match request.source() {
        RequestSource::EventTriggered(id) => mapping::resolve(id, controller.mapping()),
        RequestSource::Manual => None,
    });
    let source = request.source().to_string();

    let result = controller.apply(request);
    controller.shutdown();
    if !hooks.wait_idle(HOOK_TIMEOUT) {
        log::warn!("on_change_command still running at exit");
    }

    if opts.json {
        print_json(&ApplyOutput {
            device: controller.endpoint().identity().to_string(),
            source,
            state,
            result: result.clone(),
        })?;
    } else {
        let w = kv_width(&["Device:", "Request:", "State:", "Outcome:"], &[]);
        kv("Device:", controller.endpoint().identity(), w);
        kv("Request:", &source, w);
        match state {
            Some(s) => kv("State:", s, w),
            None => kv("State:", "(none)", w),
        }
        kv("Outcome:", &result.outcome, w);
    }

    match result.outcome {
        // Nothing to do is not an error.
        ControlOutcome::Unmapped | ControlOutcome::Unchanged => Ok(()),
        _ => result.into_result().map(|_| ()),
    }
}
