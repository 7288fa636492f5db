use std::collections::HashMap;

use super::types::RunState;

pub fn valid_state_transition(src: &RunState, dst: &RunState) -> bool {
    use crate::lib::dev::types::RunState::*;

    if *dst == RollingBack {
        return !matches!(src, RollingBack | Terminated);
    }

    let state_transition_map: HashMap<RunState, Vec<RunState>> = {
        let mut map = HashMap::new();
        map.insert(Init, vec![PortsChecked]);
        map.insert(PortsChecked, vec![SpecsBuilt]);
        map.insert(SpecsBuilt, vec![ImagesReady]);
        map.insert(ImagesReady, vec![ContainersStarted]);
        map.insert(ContainersStarted, vec![HealthChecked]);
        map.insert(HealthChecked, vec![MigrationsApplied]);
        map.insert(MigrationsApplied, vec![ConsoleRunning]);
        map.insert(ConsoleRunning, vec![Interrupted, Completed]);
        map.insert(Interrupted, vec![]);
        map.insert(Completed, vec![]);
        map.insert(RollingBack, vec![Terminated]);
        map.insert(Terminated, vec![]);
        map
    };

    if let Some(valid_states) = state_transition_map.get(src) {
        valid_states.contains(dst)
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::dev::types::RunState::*;

    #[test]
    fn happy_path_is_linear() {
        let path = [
            Init,
            PortsChecked,
            SpecsBuilt,
            ImagesReady,
            ContainersStarted,
            HealthChecked,
            MigrationsApplied,
            ConsoleRunning,
            Completed,
            RollingBack,
            Terminated,
        ];
        for pair in path.windows(2) {
            assert!(valid_state_transition(&pair[0], &pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn steps_cannot_be_skipped() {
        assert!(!valid_state_transition(&Init, &SpecsBuilt));
        assert!(!valid_state_transition(&ImagesReady, &HealthChecked));
        assert!(!valid_state_transition(&HealthChecked, &ConsoleRunning));
    }

    #[test]
    fn any_live_state_can_roll_back() {
        for state in [Init, SpecsBuilt, ContainersStarted, ConsoleRunning, Interrupted] {
            assert!(valid_state_transition(&state, &RollingBack));
        }
        assert!(!valid_state_transition(&RollingBack, &RollingBack));
        assert!(!valid_state_transition(&Terminated, &RollingBack));
        assert!(!valid_state_transition(&Terminated, &Init));
    }
}
