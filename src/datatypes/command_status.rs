// ABOUTME: SMPP v3.4 command status codes per specification Section 5.1.3
// ABOUTME: Vendor-specific codes are preserved numerically via a catch-all variant

use num_enum::{FromPrimitive, IntoPrimitive};

/// SMPP v3.4 Command Status Codes (Table 5-2).
///
/// Request PDUs carry status 0; response PDUs carry the outcome. SMSCs emit
/// vendor-specific codes outside the standard table, so conversion from the
/// wire is infallible: anything unrecognized lands in `Other` with the raw
/// value preserved for nack reasons and failure records.
#[derive(FromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    /// No error
    Ok = 0x0000_0000,
    /// Message length is invalid
    InvalidMsgLength = 0x0000_0001,
    /// Command length is invalid
    InvalidCommandLength = 0x0000_0002,
    /// Invalid command id
    InvalidCommandId = 0x0000_0003,
    /// Incorrect BIND status for given command
    IncorrectBindStatus = 0x0000_0004,
    /// ESME already in bound state
    AlreadyBound = 0x0000_0005,
    /// Invalid priority flag
    InvalidPriorityFlag = 0x0000_0006,
    /// Invalid registered delivery flag
    InvalidRegisteredDeliveryFlag = 0x0000_0007,
    /// System error
    SystemError = 0x0000_0008,
    /// Invalid source address
    InvalidSourceAddress = 0x0000_000A,
    /// Invalid destination address
    InvalidDestAddress = 0x0000_000B,
    /// Message ID is invalid
    InvalidMessageId = 0x0000_000C,
    /// Bind failed
    BindFailed = 0x0000_000D,
    /// Invalid password
    InvalidPassword = 0x0000_000E,
    /// Invalid system id
    InvalidSystemId = 0x0000_000F,
    /// Cancel SM failed
    CancelSmFailed = 0x0000_0011,
    /// Replace SM failed
    ReplaceSmFailed = 0x0000_0013,
    /// Message queue full
    MessageQueueFull = 0x0000_0014,
    /// Invalid service type
    InvalidServiceType = 0x0000_0015,
    /// Invalid number of destinations
    InvalidNumberOfDestinations = 0x0000_0033,
    /// Invalid distribution list name
    InvalidDistributionListName = 0x0000_0034,
    /// Invalid destination flag
    InvalidDestinationFlag = 0x0000_0040,
    /// Invalid submit with replace request
    InvalidSubmitWithReplace = 0x0000_0042,
    /// Invalid esm_class field data
    InvalidEsmClass = 0x0000_0043,
    /// Cannot submit to distribution list
    CannotSubmitToDistList = 0x0000_0044,
    /// submit_sm or submit_multi failed
    SubmitFailed = 0x0000_0045,
    /// Invalid source address TON
    InvalidSourceTon = 0x0000_0048,
    /// Invalid source address NPI
    InvalidSourceNpi = 0x0000_0049,
    /// Invalid destination address TON
    InvalidDestTon = 0x0000_0050,
    /// Invalid destination address NPI
    InvalidDestNpi = 0x0000_0051,
    /// Invalid system type
    InvalidSystemType = 0x0000_0053,
    /// Invalid replace_if_present flag
    InvalidReplaceIfPresentFlag = 0x0000_0054,
    /// Invalid number of messages
    InvalidNumberOfMessages = 0x0000_0055,
    /// Throttling error: ESME has exceeded allowed message limits
    Throttled = 0x0000_0058,
    /// Invalid scheduled delivery time
    InvalidScheduledDeliveryTime = 0x0000_0061,
    /// Invalid message validity period
    InvalidValidityPeriod = 0x0000_0062,
    /// Predefined message invalid or not found
    PredefinedMessageInvalid = 0x0000_0063,
    /// ESME receiver temporary app error code
    ReceiverTemporaryError = 0x0000_0064,
    /// ESME receiver permanent app error code
    ReceiverPermanentError = 0x0000_0065,
    /// ESME receiver reject message error code
    ReceiverRejectError = 0x0000_0066,
    /// query_sm request failed
    QuerySmFailed = 0x0000_0067,
    /// Error in the optional part of the PDU body
    OptionalPartError = 0x0000_00C0,
    /// Optional parameter not allowed
    OptionalParameterNotAllowed = 0x0000_00C1,
    /// Invalid parameter length
    InvalidParameterLength = 0x0000_00C2,
    /// Expected optional parameter missing
    MissingOptionalParameter = 0x0000_00C3,
    /// Invalid optional parameter value
    InvalidOptionalParameterValue = 0x0000_00C4,
    /// Delivery failure (used for data_sm_resp)
    DeliveryFailure = 0x0000_00FE,
    /// Unknown error
    UnknownError = 0x0000_00FF,

    /// Reserved, SMPP extension, or SMSC vendor specific code
    #[num_enum(catch_all)]
    Other(u32),
}

impl CommandStatus {
    /// Symbolic SMPP name as used in nack reasons and failure records
    pub fn label(&self) -> String {
        match self {
            CommandStatus::Ok => "ESME_ROK".into(),
            CommandStatus::InvalidMsgLength => "ESME_RINVMSGLEN".into(),
            CommandStatus::InvalidCommandLength => "ESME_RINVCMDLEN".into(),
            CommandStatus::InvalidCommandId => "ESME_RINVCMDID".into(),
            CommandStatus::IncorrectBindStatus => "ESME_RINVBNDSTS".into(),
            CommandStatus::AlreadyBound => "ESME_RALYBND".into(),
            CommandStatus::InvalidPriorityFlag => "ESME_RINVPRTFLG".into(),
            CommandStatus::InvalidRegisteredDeliveryFlag => "ESME_RINVREGDLVFLG".into(),
            CommandStatus::SystemError => "ESME_RSYSERR".into(),
            CommandStatus::InvalidSourceAddress => "ESME_RINVSRCADR".into(),
            CommandStatus::InvalidDestAddress => "ESME_RINVDSTADR".into(),
            CommandStatus::InvalidMessageId => "ESME_RINVMSGID".into(),
            CommandStatus::BindFailed => "ESME_RBINDFAIL".into(),
            CommandStatus::InvalidPassword => "ESME_RINVPASWD".into(),
            CommandStatus::InvalidSystemId => "ESME_RINVSYSID".into(),
            CommandStatus::CancelSmFailed => "ESME_RCANCELFAIL".into(),
            CommandStatus::ReplaceSmFailed => "ESME_RREPLACEFAIL".into(),
            CommandStatus::MessageQueueFull => "ESME_RMSGQFUL".into(),
            CommandStatus::InvalidServiceType => "ESME_RINVSERTYP".into(),
            CommandStatus::InvalidNumberOfDestinations => "ESME_RINVNUMDESTS".into(),
            CommandStatus::InvalidDistributionListName => "ESME_RINVDLNAME".into(),
            CommandStatus::InvalidDestinationFlag => "ESME_RINVDESTFLAG".into(),
            CommandStatus::InvalidSubmitWithReplace => "ESME_RINVSUBREP".into(),
            CommandStatus::InvalidEsmClass => "ESME_RINVESMCLASS".into(),
            CommandStatus::CannotSubmitToDistList => "ESME_RCNTSUBDL".into(),
            CommandStatus::SubmitFailed => "ESME_RSUBMITFAIL".into(),
            CommandStatus::InvalidSourceTon => "ESME_RINVSRCTON".into(),
            CommandStatus::InvalidSourceNpi => "ESME_RINVSRCNPI".into(),
            CommandStatus::InvalidDestTon => "ESME_RINVDSTTON".into(),
            CommandStatus::InvalidDestNpi => "ESME_RINVDSTNPI".into(),
            CommandStatus::InvalidSystemType => "ESME_RINVSYSTYP".into(),
            CommandStatus::InvalidReplaceIfPresentFlag => "ESME_RINVREPFLAG".into(),
            CommandStatus::InvalidNumberOfMessages => "ESME_RINVNUMMSGS".into(),
            CommandStatus::Throttled => "ESME_RTHROTTLED".into(),
            CommandStatus::InvalidScheduledDeliveryTime => "ESME_RINVSCHED".into(),
            CommandStatus::InvalidValidityPeriod => "ESME_RINVEXPIRY".into(),
            CommandStatus::PredefinedMessageInvalid => "ESME_RINVDFTMSGID".into(),
            CommandStatus::ReceiverTemporaryError => "ESME_RX_T_APPN".into(),
            CommandStatus::ReceiverPermanentError => "ESME_RX_P_APPN".into(),
            CommandStatus::ReceiverRejectError => "ESME_RX_R_APPN".into(),
            CommandStatus::QuerySmFailed => "ESME_RQUERYFAIL".into(),
            CommandStatus::OptionalPartError => "ESME_RINVOPTPARSTREAM".into(),
            CommandStatus::OptionalParameterNotAllowed => "ESME_ROPTPARNOTALLWD".into(),
            CommandStatus::InvalidParameterLength => "ESME_RINVPARLEN".into(),
            CommandStatus::MissingOptionalParameter => "ESME_RMISSINGOPTPARAM".into(),
            CommandStatus::InvalidOptionalParameterValue => "ESME_RINVOPTPARAMVAL".into(),
            CommandStatus::DeliveryFailure => "ESME_RDELIVERYFAILURE".into(),
            CommandStatus::UnknownError => "ESME_RUNKNOWNERR".into(),
            CommandStatus::Other(code) => format!("{code:#010x}"),
        }
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}
