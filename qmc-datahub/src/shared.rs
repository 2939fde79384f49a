use qmc_kernel::error::{QmcError, QmcResult};

use crate::types::{MotorCommand, MotorId, MotorStatus};

/// The fast control-loop's side of the command/status bridge: concrete
/// FOC/PWM math and the shared-memory word-atomic handshake between the
/// Init/Fast/Slow halves are out of scope per spec §1. `MotorControlMemory`
/// is the seam `DataHub` drives; a real target backs it with the
/// lock-free shared-memory region the fast loop writes, this crate's
/// `SimulatedMotorControl` backs it with an in-process motor model used by
/// every test here.
pub trait MotorControlMemory: Send + Sync {
    /// `MC_SetMotorCommand`: applies a command to the named motor.
    /// `Busy` if the motor is frozen, `Interrupted` if the fast loop
    /// hasn't consumed the previous command yet.
    fn set_motor_command(&self, cmd: &MotorCommand) -> QmcResult<()>;

    /// `MC_GetMotorStatus`: samples the current status of one motor.
    fn get_motor_status(&self, id: MotorId) -> MotorStatus;

    /// Sets or clears the Freeze latch independently of a queued command
    /// (`mc_unfreeze_motor`, spec §4.2).
    fn set_frozen(&self, id: MotorId, frozen: bool);

    fn is_frozen(&self, id: MotorId) -> bool;
}

/// A trivial in-process motor model: commands apply immediately and
/// update a cached status; nothing ever returns `Interrupted` since there
/// is no real fast loop to race with.
pub struct SimulatedMotorControl {
    state: std::sync::Mutex<[SimState; crate::types::MAX_MOTORS]>,
}

#[derive(Clone, Copy)]
struct SimState {
    status: MotorStatus,
    frozen: bool,
}

impl Default for SimulatedMotorControl {
    fn default() -> Self {
        let blank = SimState {
            status: MotorStatus {
                motor_id: MotorId::new(0).unwrap(),
                state: crate::types::MotorState::Init,
                fault_bitset: 0,
                i_abc: [0.0; 3],
                v_alpha_beta: [0.0; 2],
                v_bus: 0.0,
                app_switch: false,
                speed: 0.0,
                position: Default::default(),
            },
            frozen: false,
        };
        Self {
            state: std::sync::Mutex::new([blank; crate::types::MAX_MOTORS]),
        }
    }
}

impl MotorControlMemory for SimulatedMotorControl {
    fn set_motor_command(&self, cmd: &MotorCommand) -> QmcResult<()> {
        let mut state = self.state.lock().unwrap();
        let slot = &mut state[cmd.motor_id.get() as usize];
        if slot.frozen && !matches!(cmd.kind, crate::types::MotorCommandKind::Freeze) {
            return Err(QmcError::Busy);
        }
        slot.status.motor_id = cmd.motor_id;
        slot.status.state = match cmd.kind {
            crate::types::MotorCommandKind::Off => crate::types::MotorState::Stop,
            crate::types::MotorCommandKind::On => crate::types::MotorState::Run,
            crate::types::MotorCommandKind::Freeze | crate::types::MotorCommandKind::FreezeAndStop => {
                slot.frozen = true;
                crate::types::MotorState::Stop
            }
        };
        if let crate::types::MotorControlMethod::FocSpeed { speed } = cmd.method {
            slot.status.speed = speed;
        }
        Ok(())
    }

    fn get_motor_status(&self, id: MotorId) -> MotorStatus {
        self.state.lock().unwrap()[id.get() as usize].status
    }

    fn set_frozen(&self, id: MotorId, frozen: bool) {
        self.state.lock().unwrap()[id.get() as usize].frozen = frozen;
    }

    fn is_frozen(&self, id: MotorId) -> bool {
        self.state.lock().unwrap()[id.get() as usize].frozen
    }
}
