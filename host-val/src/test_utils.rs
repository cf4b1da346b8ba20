use crate::mock::{Mock, Script, ScriptedExit};
use crate::realm::{Rd, Rec};
use crate::rmi::rec::Run;
use crate::scenario::Fixture;

pub const RD: usize = 0x8800_0000;
pub const REC: usize = 0x8800_1000;

pub const RIPAS_EMPTY: &str = include_str!("../fixtures/planes_plane_exit_da_ia_ripas_empty.json");
pub const S2AP_UNPROTECTED: &str = include_str!("../fixtures/planes_s2ap_unprotected.json");
pub const TIMER_STATE: &str = include_str!("../fixtures/planes_timer_state_rec_exit.json");
pub const P0_OWNER_VIRT_INT: &str =
    include_str!("../fixtures/planes_rec_entry_p0_owner_virt_int.json");

pub fn fixture(json: &str) -> Fixture {
    Fixture::from_json(json).unwrap()
}

pub fn rd(num_aux_planes: usize, rtt_tree_pp: bool) -> Rd {
    Rd {
        addr: RD,
        num_aux_planes,
        rtt_tree_pp,
        s2sz: 40,
    }
}

pub fn rec() -> Rec {
    Rec {
        handle: REC,
        run: Run::default(),
    }
}

pub fn mock_with_rd(num_aux_planes: usize, rtt_tree_pp: bool) -> (Mock, Rd) {
    (Mock::new(Script::default()), rd(num_aux_planes, rtt_tree_pp))
}

fn exit(scripted: ScriptedExit) -> Run {
    let mut run = Run::default();
    scripted.apply(&mut run).unwrap();
    run
}

pub fn host_call_exit(gprs: &[(usize, u64)]) -> Run {
    let scripted = gprs
        .iter()
        .fold(ScriptedExit::host_call(), |exit, &(idx, val)| exit.with_gpr(idx, val));
    exit(scripted)
}

pub fn data_abort_exit(ipa: usize, dfsc: u64, emulatable: bool, write: bool) -> Run {
    exit(ScriptedExit::data_abort(ipa, dfsc, emulatable, write))
}
