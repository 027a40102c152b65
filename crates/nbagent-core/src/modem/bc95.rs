//! Bring-up plan for the Quectel BC95 NB-IoT modem
//!
//! Radio off, scrambling and SI-avoidance on, autoconnect off, reboot, band
//! 20, registration and signalling reports on, radio on, then attach to the
//! Vodafone Spain NB-IoT APN and PLMN. The trailing CSQ/NUESTATS queries only
//! leave signal diagnostics in the modem log.

use super::ModemSequenceStep;

pub const BRING_UP: &[ModemSequenceStep] = &[
    ModemSequenceStep::new("AT", 100),
    ModemSequenceStep::new("AT", 100),
    ModemSequenceStep::new("AT+CFUN=0", 100),
    ModemSequenceStep::new("AT+NCONFIG=AUTOCONNECT,FALSE", 100),
    ModemSequenceStep::new("AT+NCONFIG=CR_0354_0338_SCRAMBLING,TRUE", 100),
    ModemSequenceStep::new("AT+NCONFIG=CR_0859_SI_AVOID,TRUE", 100),
    // Reboot to apply NCONFIG
    ModemSequenceStep::new("AT+NRB", 5000),
    ModemSequenceStep::new("AT+NBAND=20", 100),
    ModemSequenceStep::new("AT+CEREG=2", 300),
    ModemSequenceStep::new("AT+CSCON=1", 100),
    ModemSequenceStep::new("AT+CFUN=1", 100),
    ModemSequenceStep::new("AT+NBAND?", 100),
    ModemSequenceStep::new("AT+CEREG=2", 300),
    ModemSequenceStep::new("AT+CSCON=1", 100),
    ModemSequenceStep::new("AT+CFUN=1", 100),
    ModemSequenceStep::new("AT+CGDCONT=0,\"IP\",\"spe.inetd.vodafone.nbiot\"", 200),
    ModemSequenceStep::new("AT+COPS=1,2,\"21401\"", 300),
    ModemSequenceStep::new("AT+CSQ", 300),
    ModemSequenceStep::new("AT+NUESTATS", 300),
    ModemSequenceStep::new("AT+CSQ", 300),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reboot_gets_the_long_settle() {
        let nrb = BRING_UP.iter().find(|s| s.command == "AT+NRB").unwrap();
        assert_eq!(nrb.settle.as_millis(), 5000);
    }

    #[test]
    fn test_commands_fit_a_single_line() {
        for step in BRING_UP {
            assert!(step.command.starts_with("AT"));
            assert!(!step.command.contains('\r') && !step.command.contains('\n'));
        }
    }
}
